//! Active company resolution, cached for the life of the process.

use crate::config::{ApiConfig, ConfigError, user_agent};
use crate::retry::{RetryConfig, execute_with_retry};
use anyhow::{Context, anyhow};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::info;

pub struct CompanyContext {
    api: ApiConfig,
    http: reqwest::Client,
    retry: RetryConfig,
    company: OnceCell<String>,
}

impl CompanyContext {
    pub fn new(api: ApiConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent())
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            api,
            http,
            retry: RetryConfig::default(),
            company: OnceCell::new(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    /// The configured company, or `activeCompany` of the token's user.
    ///
    /// The remote lookup happens at most once; a failed lookup is not cached.
    pub async fn active_company(&self) -> Result<String, ConfigError> {
        self.company
            .get_or_try_init(|| async {
                match &self.api.company {
                    Some(company) => Ok(company.clone()),
                    None => self.fetch_active_company().await,
                }
            })
            .await
            .cloned()
    }

    async fn fetch_active_company(&self) -> Result<String, ConfigError> {
        let url = &self.api.endpoint(&["api", "user"])?;
        let http = &self.http;
        let token = self.api.token.as_str();
        let company = execute_with_retry(&self.retry, || async move {
            let response = http
                .get(url.clone())
                .bearer_auth(token)
                .send()
                .await
                .context("error sending request")?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("HTTP {} {}", status.as_u16(), body.trim()));
            }

            let user: Value = response.json().await.context("invalid user response")?;
            user.get("activeCompany")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .ok_or_else(|| anyhow!("user has no activeCompany"))
        })
        .await
        .map_err(|e| ConfigError::CompanyLookup(format!("{e:#}")))?;

        info!("Active company resolved: {}", company);
        Ok(company)
    }
}

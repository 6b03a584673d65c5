//! # Configuration
//!
//! API settings are resolved once at startup with the precedence
//! command-line flag, then environment variable, then built-in default.
//!
//! | Setting        | Flag               | Environment            | Default                  |
//! |----------------|--------------------|------------------------|--------------------------|
//! | token          | `TOKEN` positional | `HELPMETEST_API_TOKEN` | required                 |
//! | API base URL   | `--api-url`        | `HELPMETEST_API_URL`   | `https://helpmetest.com` |
//! | company        | `--company`        | `HELPMETEST_COMPANY`   | looked up remotely       |
//! | stream pattern | `--stream-pattern` |                        | the company name         |
//!
//! [`BusSettings`] carries the event bus timings.

use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://helpmetest.com";
pub const ENV_API_TOKEN: &str = "HELPMETEST_API_TOKEN";
pub const ENV_API_URL: &str = "HELPMETEST_API_URL";
pub const ENV_COMPANY: &str = "HELPMETEST_COMPANY";
pub const ENV_DEBUG: &str = "HELPMETEST_DEBUG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No API token: pass TOKEN or set HELPMETEST_API_TOKEN")]
    MissingToken,

    #[error("Invalid API URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("API URL cannot carry a path: {0}")]
    CannotBeBase(String),

    #[error("Could not determine the active company: {0}")]
    CompanyLookup(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Values given on the command line; `None` falls through to the environment.
#[derive(Debug, Clone, Default)]
pub struct ApiOverrides {
    pub token: Option<String>,
    pub api_url: Option<String>,
    pub company: Option<String>,
    pub stream_pattern: Option<String>,
}

#[derive(Clone)]
pub struct ApiConfig {
    pub api_url: Url,
    pub token: String,
    pub company: Option<String>,
    pub stream_pattern: Option<String>,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_url", &self.api_url.as_str())
            .field("token", &"<redacted>")
            .field("company", &self.company)
            .field("stream_pattern", &self.stream_pattern)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ApiConfig {
    /// Resolve against the process environment.
    pub fn resolve(overrides: ApiOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |name| std::env::var(name).ok())
    }

    /// Resolve against an arbitrary environment lookup.
    pub fn resolve_with<F>(overrides: ApiOverrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = non_empty(overrides.token)
            .or_else(|| non_empty(env(ENV_API_TOKEN)))
            .ok_or(ConfigError::MissingToken)?;

        let raw_url = non_empty(overrides.api_url)
            .or_else(|| non_empty(env(ENV_API_URL)))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&raw_url).map_err(|source| ConfigError::InvalidUrl {
            url: raw_url.clone(),
            source,
        })?;
        if api_url.cannot_be_a_base() {
            return Err(ConfigError::CannotBeBase(raw_url));
        }

        Ok(Self {
            api_url,
            token,
            company: non_empty(overrides.company).or_else(|| non_empty(env(ENV_COMPANY))),
            stream_pattern: non_empty(overrides.stream_pattern),
        })
    }

    /// `{api_url}/{segments...}`, keeping any path prefix of the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ConfigError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConfigError::CannotBeBase(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Stream subscription pattern, defaulting to the company name.
    pub fn stream_pattern_for(&self, company: &str) -> String {
        self.stream_pattern
            .clone()
            .unwrap_or_else(|| company.to_string())
    }
}

/// `User-Agent` sent on every outbound request.
pub fn user_agent() -> String {
    format!("HelpMeTest-CLI/{}", env!("CARGO_PKG_VERSION"))
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// True when the environment variable is set to a truthy value.
pub fn env_flag_enabled(name: &str) -> bool {
    std::env::var(name).map(|v| is_truthy(&v)).unwrap_or(false)
}

/// Timings and limits of the event bus.
#[derive(Debug, Clone)]
pub struct BusSettings {
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Default wait of `get_pending_messages`.
    pub pending_default_wait: Duration,
    /// Default wait of `listen_to_events`.
    pub listen_default_wait: Duration,
    /// Upper bound accepted for a caller-supplied wait.
    pub max_wait: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// Silence after which the stream connection is dropped and reopened.
    pub stream_idle_timeout: Duration,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            queue_capacity: crate::event_bus::queue::MAX_QUEUE_SIZE,
            poll_interval: Duration::from_millis(500),
            heartbeat_interval: crate::heartbeat::HEARTBEAT_INTERVAL,
            pending_default_wait: Duration::from_millis(500),
            listen_default_wait: Duration::from_millis(5000),
            max_wait: Duration::from_secs(600),
            reconnect_initial: Duration::from_millis(1000),
            reconnect_max: Duration::from_secs(60),
            stream_idle_timeout: helpmetest_stream_client::client::DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl BusSettings {
    /// Wait to use for a caller-supplied value in milliseconds.
    pub fn clamp_wait(&self, requested_ms: Option<u64>, default: Duration) -> Duration {
        requested_ms
            .map(Duration::from_millis)
            .unwrap_or(default)
            .min(self.max_wait)
    }
}

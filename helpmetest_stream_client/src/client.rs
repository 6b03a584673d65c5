use crate::backoff::{DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY, ReconnectBackoff};
use crate::error::{Result, StreamError};
use crate::records::{RecordSplitter, parse_record};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Upper bound on establishing the TCP/TLS connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// A stream that delivers no bytes for this long is treated as dead.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Receives every decoded record, in arrival order.
#[async_trait::async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle_record(&self, record: Map<String, Value>);
}

/// Connection settings for [`EventStreamClient`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub base_url: Url,
    pub pattern: String,
    pub token: String,
    pub user_agent: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub idle_timeout: Duration,
}

impl StreamConfig {
    pub fn new(base_url: Url, pattern: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url,
            pattern: pattern.into(),
            token: token.into(),
            user_agent: format!("HelpMeTest-CLI/{}", env!("CARGO_PKG_VERSION")),
            initial_backoff: DEFAULT_INITIAL_DELAY,
            max_backoff: DEFAULT_MAX_DELAY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// Build `{base}/api/stream/{pattern}`, keeping any path prefix of `base`.
pub fn stream_endpoint(base_url: &Url, pattern: &str) -> Result<Url> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(StreamError::InvalidPattern(pattern.to_string()));
    }

    let mut endpoint = base_url.clone();
    endpoint
        .path_segments_mut()
        .map_err(|_| StreamError::InvalidBaseUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(["api", "stream", trimmed]);
    Ok(endpoint)
}

/// Long-lived subscription to the streaming endpoint.
pub struct EventStreamClient {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
    initial_backoff: Duration,
    max_backoff: Duration,
    idle_timeout: Duration,
}

/// How one connection attempt ended.
#[derive(Debug)]
enum Attempt {
    /// The stream was opened and later stopped for this reason.
    Connected(StreamError),
    /// The stream could not be opened.
    Failed(StreamError),
}

impl EventStreamClient {
    pub fn new(config: StreamConfig) -> Result<Self> {
        let endpoint = stream_endpoint(&config.base_url, &config.pattern)?;
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            token: config.token,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            idle_timeout: config.idle_timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Open the streaming request. Non-2xx answers become [`StreamError::Status`].
    pub async fn connect(&self) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Status { status, body });
        }
        Ok(response)
    }

    /// Feed an open response into `handler` until the body ends or fails.
    ///
    /// Returns the reason the stream stopped; a clean end of body is
    /// [`StreamError::Closed`] since the server is expected to stream forever.
    /// A body that stays silent for the idle timeout ends with
    /// [`StreamError::Idle`].
    pub async fn pump(
        &self,
        response: reqwest::Response,
        handler: &dyn RecordHandler,
    ) -> StreamError {
        let mut splitter = RecordSplitter::new();
        let mut body = response.bytes_stream();

        loop {
            let item = match tokio::time::timeout(self.idle_timeout, body.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => return StreamError::Idle(self.idle_timeout),
            };
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => return StreamError::HttpRequest(e),
            };
            for fragment in splitter.feed(&chunk) {
                match parse_record(&fragment) {
                    Some(record) => handler.handle_record(record).await,
                    None => debug!(
                        "Dropped unparseable stream record ({} bytes)",
                        fragment.len()
                    ),
                }
            }
        }

        if splitter.pending_len() > 0 {
            debug!(
                "Stream ended with {} bytes of incomplete record",
                splitter.pending_len()
            );
        }
        StreamError::Closed
    }

    /// Connect and pump forever, reconnecting with exponential backoff.
    ///
    /// There is no retry limit. A successful connection resets the backoff,
    /// even if the stream drops again later.
    pub async fn run(&self, handler: Arc<dyn RecordHandler>) {
        let handler: &dyn RecordHandler = handler.as_ref();
        let backoff = ReconnectBackoff::new(self.initial_backoff, self.max_backoff);
        reconnect_forever(backoff, move || self.attempt(handler), tokio::time::sleep).await
    }

    async fn attempt(&self, handler: &dyn RecordHandler) -> Attempt {
        match self.connect().await {
            Ok(response) => {
                info!("Event stream connected to {}", self.endpoint);
                Attempt::Connected(self.pump(response, handler).await)
            }
            Err(e) => Attempt::Failed(e),
        }
    }

    /// Run the reconnect loop on the tokio runtime.
    pub fn spawn(self, handler: Arc<dyn RecordHandler>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(handler).await })
    }
}

async fn reconnect_forever<A, AFut, S, SFut>(
    mut backoff: ReconnectBackoff,
    mut attempt: A,
    mut sleep: S,
) where
    A: FnMut() -> AFut,
    AFut: Future<Output = Attempt>,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    loop {
        let reason = match attempt().await {
            Attempt::Connected(reason) => {
                backoff.reset();
                reason
            }
            Attempt::Failed(reason) => reason,
        };

        let delay = backoff.next_delay();
        warn!(
            retry = backoff.retry_count(),
            delay_ms = delay.as_millis() as u64,
            "Event stream lost: {}; reconnecting",
            reason
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[test]
    fn endpoint_from_bare_host() {
        let base = Url::parse("https://helpmetest.com").unwrap();
        let url = stream_endpoint(&base, "acme").expect("url");
        assert_eq!(url.as_str(), "https://helpmetest.com/api/stream/acme");
    }

    #[test]
    fn endpoint_keeps_path_prefix() {
        let base = Url::parse("https://example.com/proxy/").unwrap();
        let url = stream_endpoint(&base, "acme").expect("url");
        assert_eq!(url.as_str(), "https://example.com/proxy/api/stream/acme");
    }

    #[test]
    fn endpoint_escapes_pattern() {
        let base = Url::parse("https://helpmetest.com").unwrap();
        let url = stream_endpoint(&base, "acme room").expect("url");
        assert_eq!(url.as_str(), "https://helpmetest.com/api/stream/acme%20room");
    }

    #[test]
    fn endpoint_rejects_empty_pattern() {
        let base = Url::parse("https://helpmetest.com").unwrap();
        assert!(stream_endpoint(&base, "  ").is_err());
    }

    #[test]
    fn endpoint_rejects_cannot_be_base_url() {
        let base = Url::parse("mailto:ops@example.com").unwrap();
        assert!(stream_endpoint(&base, "acme").is_err());
    }

    /// Feed `script` to the reconnect loop and collect the delays it sleeps for.
    async fn delays_for(script: Vec<Attempt>) -> Vec<Duration> {
        let script = Mutex::new(VecDeque::from(script));
        let delays = Mutex::new(Vec::<Duration>::new());

        let attempt = || {
            let next = script.lock().unwrap().pop_front();
            async move {
                match next {
                    Some(outcome) => outcome,
                    None => futures::future::pending().await,
                }
            }
        };
        let sleep = |delay: Duration| {
            delays.lock().unwrap().push(delay);
            async {}
        };

        let run = reconnect_forever(ReconnectBackoff::default(), attempt, sleep);
        let _ = tokio::time::timeout(Duration::from_secs(1), run).await;
        delays.into_inner().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delays_grow_and_reset_after_connecting() {
        let delays = delays_for(vec![
            Attempt::Failed(StreamError::Closed),
            Attempt::Failed(StreamError::Closed),
            Attempt::Connected(StreamError::Closed),
            Attempt::Failed(StreamError::Closed),
        ])
        .await;

        let ms: Vec<u128> = delays.iter().map(Duration::as_millis).collect();
        assert_eq!(ms, vec![1000, 2000, 1000, 2000]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delays_are_capped() {
        let script = (0..9)
            .map(|_| Attempt::Failed(StreamError::Closed))
            .collect();
        let delays = delays_for(script).await;

        assert_eq!(delays.len(), 9);
        assert_eq!(delays[5], Duration::from_secs(32));
        assert!(delays[6..].iter().all(|d| *d == Duration::from_secs(60)));
    }

    #[test]
    fn idle_timeout_defaults_and_overrides() {
        let base = Url::parse("https://helpmetest.com").unwrap();
        let config = StreamConfig::new(base, "acme", "token");
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        let config = config.with_idle_timeout(Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
    }
}

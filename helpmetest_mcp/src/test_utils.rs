//! Test helpers shared by unit and integration tests.
//!
//! These APIs are intended for test-only code paths.

use crate::notifier::{NotifyBody, NotifyError, NotifyTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::sync::Notify;

/// In-memory [`NotifyTransport`] that records every post.
#[derive(Default)]
pub struct RecordingTransport {
    posts: Mutex<Vec<NotifyBody>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    posted: Notify,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following post fail with HTTP 503.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every following post for `delay` before recording it.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn posts(&self) -> Vec<NotifyBody> {
        self.posts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Posts whose envelope has `_type_ == kind`.
    pub fn posts_of_type(&self, kind: &str) -> Vec<NotifyBody> {
        self.posts()
            .into_iter()
            .filter(|body| body.message.get("_type_").and_then(Value::as_str) == Some(kind))
            .collect()
    }

    /// Posts acknowledging a message as processed.
    pub fn acknowledgements(&self) -> Vec<NotifyBody> {
        self.posts()
            .into_iter()
            .filter(|body| {
                body.message.get("status").and_then(Value::as_str) == Some("processed")
                    && body.message.get("_type_").is_none()
            })
            .collect()
    }

    /// Wait until `predicate` holds for the recorded posts, or `timeout` elapses.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[NotifyBody]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.posted.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if predicate(&self.posts()) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return predicate(&self.posts());
            }
        }
    }
}

#[async_trait]
impl NotifyTransport for RecordingTransport {
    async fn post(&self, body: NotifyBody) -> Result<(), NotifyError> {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.posts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(body);
        self.posted.notify_waiters();
        Ok(())
    }
}

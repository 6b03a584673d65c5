//! Liveness heartbeats while a consumer is blocked waiting.

use crate::notifier::OutboundNotifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default spacing between heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Sends one heartbeat right away, then one per interval until dropped.
///
/// The first heartbeat runs detached so it is delivered even when the wait it
/// belongs to finishes immediately. The repeating task is aborted on drop.
pub struct Heartbeat {
    repeating: JoinHandle<()>,
}

impl Heartbeat {
    pub fn start(notifier: Arc<OutboundNotifier>, room: String, interval: Duration) -> Self {
        {
            let notifier = notifier.clone();
            let room = room.clone();
            tokio::spawn(async move {
                let _ = notifier.heartbeat(&room).await;
            });
        }

        let repeating = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = notifier.heartbeat(&room).await;
            }
        });

        Self { repeating }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.repeating.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingTransport;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn beats_immediately_then_every_interval() {
        let transport = Arc::new(RecordingTransport::new());
        let notifier = Arc::new(OutboundNotifier::new(transport.clone()));

        let heartbeat = Heartbeat::start(notifier, "chat.acme".to_string(), HEARTBEAT_INTERVAL);
        settle().await;
        assert_eq!(transport.posts_of_type("Heartbeat").len(), 1);

        tokio::time::sleep(Duration::from_millis(6_100)).await;
        settle().await;
        assert_eq!(transport.posts_of_type("Heartbeat").len(), 3);

        drop(heartbeat);
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.posts_of_type("Heartbeat").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_heartbeats_keep_ticking() {
        let transport = Arc::new(RecordingTransport::new());
        transport.set_failing(true);
        let notifier = Arc::new(OutboundNotifier::new(transport.clone()));

        let _heartbeat = Heartbeat::start(notifier, "chat.acme".to_string(), HEARTBEAT_INTERVAL);
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        transport.set_failing(false);
        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(transport.posts_of_type("Heartbeat").len(), 1);
    }
}

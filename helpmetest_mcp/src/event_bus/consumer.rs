//! Blocking consumer operations on the [`EventBus`].
//!
//! Both operations check the queue immediately, then again on every arrival
//! and every poll tick, until something qualifies or the wait runs out. A
//! heartbeat runs for the duration of each call and stops on every exit path.

use super::format::{
    NO_NEW_EVENTS, NO_PENDING_MESSAGES, format_event_digest, format_no_messages_with_backlog,
    format_pending_messages, kind_summary,
};
use super::types::{EventPayload, EventRecord, MessageStatus, UserMessage};
use super::{BusState, EventBus};
use crate::heartbeat::Heartbeat;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of `get_pending_messages`.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOutcome {
    Messages(Vec<UserMessage>),
    /// Timed out with the queue completely empty.
    Empty,
    /// Timed out with no user messages but other events still queued.
    OtherEventsQueued(usize),
}

impl PendingOutcome {
    pub fn render(&self) -> String {
        match self {
            PendingOutcome::Messages(messages) => format_pending_messages(messages),
            PendingOutcome::Empty => NO_PENDING_MESSAGES.to_string(),
            PendingOutcome::OtherEventsQueued(n) => format_no_messages_with_backlog(*n),
        }
    }
}

/// Result of `listen_to_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenOutcome {
    Events {
        events: Vec<EventRecord>,
        requires_send_to_ui: bool,
    },
    NoEvents,
}

impl ListenOutcome {
    pub fn render(&self) -> String {
        match self {
            ListenOutcome::Events {
                events,
                requires_send_to_ui,
            } => format_event_digest(events, *requires_send_to_ui),
            ListenOutcome::NoEvents => NO_NEW_EVENTS.to_string(),
        }
    }
}

impl EventBus {
    /// Mode A: remove and return user messages still awaiting processing.
    ///
    /// Other kinds stay queued. Returned messages are acknowledged as
    /// processed in the background; user messages already acknowledged by
    /// `listen_to_events` are removed without being returned.
    pub async fn get_pending_messages(&self, max_wait: Duration) -> PendingOutcome {
        let _gate = self.pending_gate.lock().await;
        self.start_listener_quietly();
        let _heartbeat = self.start_heartbeat();

        let found = self
            .wait_for(max_wait, |state| {
                if !state.queue.has_pending_user_message() {
                    return None;
                }
                let messages: Vec<UserMessage> = state
                    .queue
                    .take_user_messages()
                    .into_iter()
                    .filter_map(|record| match record.payload {
                        EventPayload::UserMessage(m) if m.status == MessageStatus::Processing => {
                            Some(m)
                        }
                        _ => None,
                    })
                    .collect();
                Some(messages)
            })
            .await;

        match found {
            Some(messages) => {
                info!("Delivering {} pending user message(s)", messages.len());
                self.acknowledge(messages.clone());
                PendingOutcome::Messages(messages)
            }
            None => {
                let remaining = {
                    let mut state = self.lock_state();
                    let dropped = state.queue.drop_processed_user_messages();
                    if dropped > 0 {
                        debug!("Dropped {} already acknowledged user message(s)", dropped);
                    }
                    state.queue.len()
                };
                match remaining {
                    0 => PendingOutcome::Empty,
                    n => PendingOutcome::OtherEventsQueued(n),
                }
            }
        }
    }

    /// Mode B: every event queued after the cursor, of any kind.
    ///
    /// The cursor moves past the returned events; user messages among them
    /// are marked processed in the queue and acknowledged in the background.
    pub async fn listen_to_events(&self, max_wait: Duration) -> ListenOutcome {
        let _gate = self.listen_gate.lock().await;
        self.start_listener_quietly();
        let _heartbeat = self.start_heartbeat();

        let found = self
            .wait_for(max_wait, |state| {
                let events = state.queue.since(state.cursor);
                let last = events.last()?.sequence_id;
                state.cursor = last;

                let fresh: Vec<UserMessage> = events
                    .iter()
                    .filter_map(|r| r.payload.as_user_message())
                    .filter(|m| m.status == MessageStatus::Processing)
                    .cloned()
                    .collect();
                let ids: Vec<String> = fresh.iter().map(|m| m.message_id.clone()).collect();
                state.queue.mark_processed(&ids);
                Some((events, fresh))
            })
            .await;

        match found {
            Some((events, fresh)) => {
                info!(
                    "Delivering {} event(s) ({})",
                    events.len(),
                    kind_summary(&events)
                );
                self.acknowledge(fresh);
                ListenOutcome::Events {
                    events,
                    requires_send_to_ui: self.notifier.requires_send_to_ui(),
                }
            }
            None => ListenOutcome::NoEvents,
        }
    }

    fn start_listener_quietly(&self) {
        if let Err(e) = self.ensure_listener() {
            warn!("Event listener not running, will retry on next call: {}", e);
        }
    }

    fn start_heartbeat(&self) -> Heartbeat {
        Heartbeat::start(
            self.notifier.clone(),
            self.chat_room(),
            self.settings.heartbeat_interval,
        )
    }

    /// Best-effort acknowledgement of delivered messages.
    fn acknowledge(&self, messages: Vec<UserMessage>) {
        if messages.is_empty() {
            return;
        }
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let deliveries =
                futures::future::join_all(messages.iter().map(|m| notifier.mark_processed(m)))
                    .await;
            let failed = deliveries.iter().filter(|d| !d.is_delivered()).count();
            if failed > 0 {
                debug!("{} of {} acknowledgement(s) failed", failed, deliveries.len());
            }
        });
    }

    /// Run `check` now, on every arrival and poll tick, and once more when
    /// `max_wait` runs out. Waits never exceed `settings.max_wait`.
    async fn wait_for<T, F>(&self, max_wait: Duration, mut check: F) -> Option<T>
    where
        F: FnMut(&mut BusState) -> Option<T>,
    {
        let deadline = Instant::now() + max_wait.min(self.settings.max_wait);
        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes at once; the initial check covers it.
        poll.tick().await;

        loop {
            let arrived = self.arrivals.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            let found = {
                let mut state = self.lock_state();
                check(&mut state)
            };
            if found.is_some() {
                return found;
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = poll.tick() => {}
                _ = arrived.as_mut() => {}
            }
        }

        let mut state = self.lock_state();
        check(&mut state)
    }
}

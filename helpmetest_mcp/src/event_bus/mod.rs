//! # Event Bus
//!
//! The `EventBus` owns everything the MCP tools share: the bounded event queue,
//! the Mode B cursor, the interactive session registry, the outbound notifier
//! and the supervised stream listener.
//!
//! ## Data flow
//!
//! ```text
//! stream task --records--> EventBus::ingest --enqueue--> EventQueue
//!                                                      ^
//! get_pending_messages / listen_to_events ---reads-----+--> OutboundNotifier (acks)
//! ```
//!
//! The stream listener is started lazily by the first consumer call and holds
//! only a weak reference back to the bus, so dropping the last `Arc<EventBus>`
//! aborts the listener.
//!
//! Each consumer mode is serialised by its own async gate, so overlapping
//! calls of the same mode run one after the other instead of racing on the
//! cursor or on the queue.

pub mod consumer;
pub mod format;
pub mod queue;
pub mod registry;
pub mod supervisor;
pub mod types;

pub use consumer::{ListenOutcome, PendingOutcome};
pub use queue::{Admission, EventQueue, MAX_QUEUE_SIZE};
pub use registry::SessionRegistry;
pub use supervisor::{HttpStreamLauncher, StreamLauncher, StreamSupervisor, SupervisorError};
pub use types::{EventKind, EventPayload, EventRecord, InboundEvent, MessageStatus, UserMessage};

use crate::config::BusSettings;
use crate::notifier::OutboundNotifier;
use async_trait::async_trait;
use helpmetest_common::task_state::TaskState;
use helpmetest_stream_client::client::RecordHandler;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Queue plus the Mode B cursor, guarded together.
#[derive(Debug)]
pub(crate) struct BusState {
    pub(crate) queue: EventQueue,
    /// Sequence id of the last record delivered by `listen_to_events`.
    pub(crate) cursor: u64,
}

/// A freshly opened interactive session.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractiveSession {
    pub timestamp: u64,
    pub room: String,
    pub available_rooms: Vec<String>,
}

pub struct EventBus {
    company: String,
    settings: BusSettings,
    state: Mutex<BusState>,
    arrivals: Notify,
    registry: SessionRegistry,
    notifier: Arc<OutboundNotifier>,
    supervisor: StreamSupervisor,
    pending_gate: tokio::sync::Mutex<()>,
    listen_gate: tokio::sync::Mutex<()>,
    self_ref: Weak<EventBus>,
}

impl EventBus {
    /// Create a bus for `company`.
    ///
    /// With `launcher == None` no stream is ever started and events only enter
    /// through [`EventBus::enqueue`] and [`EventBus::ingest`].
    pub fn new(
        company: impl Into<String>,
        settings: BusSettings,
        notifier: Arc<OutboundNotifier>,
        launcher: Option<Arc<dyn StreamLauncher>>,
    ) -> Arc<Self> {
        let company = company.into();
        Arc::new_cyclic(|self_ref| Self {
            company,
            state: Mutex::new(BusState {
                queue: EventQueue::new(settings.queue_capacity),
                cursor: 0,
            }),
            settings,
            arrivals: Notify::new(),
            registry: SessionRegistry::new(),
            notifier,
            supervisor: StreamSupervisor::new(launcher),
            pending_gate: tokio::sync::Mutex::new(()),
            listen_gate: tokio::sync::Mutex::new(()),
            self_ref: self_ref.clone(),
        })
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn settings(&self) -> &BusSettings {
        &self.settings
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &Arc<OutboundNotifier> {
        &self.notifier
    }

    pub fn chat_room(&self) -> String {
        registry::chat_room(&self.company)
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, BusState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admit an event and wake any waiting consumer.
    pub fn enqueue(&self, payload: EventPayload) -> Admission {
        let admission = self.lock_state().queue.enqueue(payload);
        if admission.is_queued() {
            self.arrivals.notify_waiters();
        }
        admission
    }

    /// Enqueue a system message, at most once per `injection_key`.
    pub fn inject_system_message(
        &self,
        content: impl Into<String>,
        injection_key: Option<&str>,
    ) -> Admission {
        let admission = self
            .lock_state()
            .queue
            .inject_system_message(content, injection_key);
        if admission.is_queued() {
            self.arrivals.notify_waiters();
        }
        admission
    }

    /// Snapshot and clear the whole queue.
    pub fn drain_all(&self) -> Vec<EventRecord> {
        self.lock_state().queue.drain_all()
    }

    pub fn queue_len(&self) -> usize {
        self.lock_state().queue.len()
    }

    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.lock_state().queue.iter().cloned().collect()
    }

    /// Sequence id of the last event delivered by `listen_to_events`.
    pub fn cursor(&self) -> u64 {
        self.lock_state().cursor
    }

    /// Queue position of the last delivered event still held, if any.
    pub fn cursor_position(&self) -> Option<usize> {
        let state = self.lock_state();
        state.queue.position_of(state.cursor)
    }

    /// Route one decoded stream record.
    pub async fn ingest(&self, record: Map<String, Value>) {
        match types::classify(&record) {
            Some(InboundEvent::Ping { room, id }) => {
                trace!("Ping for room '{}'", room);
                let notifier = Arc::clone(&self.notifier);
                tokio::spawn(async move {
                    let _ = notifier.acknowledge_ping(&room, id.as_deref()).await;
                });
            }
            Some(InboundEvent::Queued(payload)) => {
                let kind = payload.kind();
                match self.enqueue(payload) {
                    Admission::Queued { sequence_id } => {
                        debug!("Queued {} #{}", kind.as_str(), sequence_id)
                    }
                    other => trace!("{} not queued: {:?}", kind.as_str(), other),
                }
            }
            None => trace!("Ignoring unrecognised stream record"),
        }
    }

    pub fn listener_state(&self) -> TaskState {
        self.supervisor.state()
    }

    /// Start the stream listener if it is not running.
    pub fn ensure_listener(&self) -> Result<(), SupervisorError> {
        let bus = self.self_ref.clone();
        self.supervisor
            .ensure_started(|| Arc::new(BusIngest { bus }) as Arc<dyn RecordHandler>)
    }

    /// Stop the stream listener. Also happens when the bus is dropped.
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    pub fn is_valid_room(&self, room: &str) -> bool {
        self.registry.is_valid_room(room, &self.company)
    }

    pub fn available_rooms(&self) -> Vec<String> {
        self.registry.available_rooms(&self.company)
    }

    /// Register a new interactive session and require a UI update for it.
    pub fn open_interactive_session(&self) -> InteractiveSession {
        let timestamp = self.registry.open_session();
        self.notifier.set_requires_send_to_ui(true);
        InteractiveSession {
            timestamp,
            room: registry::interactive_room(&self.company, timestamp),
            available_rooms: self.available_rooms(),
        }
    }
}

/// Stream handler feeding a bus it does not keep alive.
struct BusIngest {
    bus: Weak<EventBus>,
}

#[async_trait]
impl RecordHandler for BusIngest {
    async fn handle_record(&self, record: Map<String, Value>) {
        if let Some(bus) = self.bus.upgrade() {
            bus.ingest(record).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingTransport;
    use serde_json::json;
    use std::time::Duration;

    fn bus() -> (Arc<RecordingTransport>, Arc<EventBus>) {
        let transport = Arc::new(RecordingTransport::new());
        let notifier = Arc::new(OutboundNotifier::new(transport.clone()));
        (
            transport,
            EventBus::new("acme", BusSettings::default(), notifier, None),
        )
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn ingest_routes_records_by_kind() {
        let (transport, bus) = bus();
        bus.ingest(object(json!({
            "sender": "user", "text": "hi", "status": "processing",
            "messageId": "m1", "room": "chat.acme"
        })))
        .await;
        bus.ingest(object(json!({"type": "test_status_change", "testId": "t1", "status": "failed"})))
            .await;
        bus.ingest(object(json!({"_type_": "ping", "room": "chat.acme", "id": "p1"})))
            .await;
        bus.ingest(object(json!({"unrelated": true}))).await;

        let kinds: Vec<EventKind> = bus.snapshot().iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![EventKind::UserMessage, EventKind::TestStatusChange]);

        assert!(
            transport
                .wait_until(Duration::from_secs(5), |posts| !posts.is_empty())
                .await
        );
        let pongs = transport.posts_of_type("Pong");
        assert_eq!(pongs.len(), 1);
        assert_eq!(pongs[0].room, "chat.acme");
        assert_eq!(pongs[0].key, "p1");
        assert_eq!(pongs[0].message["status"], json!("processed"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ping_acknowledgement_does_not_block_ingest() {
        let (transport, bus) = bus();
        transport.set_delay(Duration::from_secs(30));

        let ingested = tokio::time::timeout(
            Duration::from_secs(1),
            bus.ingest(object(json!({"_type_": "ping", "room": "chat.acme", "id": "p2"}))),
        )
        .await;
        assert!(ingested.is_ok(), "ingest waited on the pong");
        assert!(transport.posts_of_type("Pong").is_empty());

        assert!(
            transport
                .wait_until(Duration::from_secs(60), |posts| !posts.is_empty())
                .await
        );
        assert_eq!(transport.posts_of_type("Pong")[0].key, "p2");
    }

    #[tokio::test]
    async fn handler_does_not_keep_bus_alive() {
        let (_transport, bus) = bus();
        let handler = BusIngest {
            bus: Arc::downgrade(&bus),
        };
        drop(bus);
        handler.handle_record(object(json!({"type": "test_status_change"}))).await;
        assert!(handler.bus.upgrade().is_none());
    }

    #[test]
    fn interactive_session_sets_ui_flag_and_room() {
        let (_transport, bus) = bus();
        let session = bus.open_interactive_session();
        assert!(bus.notifier().requires_send_to_ui());
        assert_eq!(session.room, format!("acme__interactive__{}", session.timestamp));
        assert!(bus.is_valid_room(&session.room));
        assert_eq!(session.available_rooms[0], "chat.acme");
        assert!(session.available_rooms.contains(&session.room));
    }

    #[test]
    fn system_message_injection_is_keyed() {
        let (_transport, bus) = bus();
        assert!(bus.inject_system_message("hello", Some("startup")).is_queued());
        assert_eq!(
            bus.inject_system_message("hello", Some("startup")),
            Admission::AlreadyInjected
        );
        assert_eq!(bus.drain_all().len(), 1);
        assert_eq!(bus.queue_len(), 0);
    }
}

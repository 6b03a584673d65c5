//! Event records held by the queue, and classification of raw stream records.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Delivery status of a user chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Processing,
    Processed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Processing => "processing",
            MessageStatus::Processed => "processed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserMessage {
    pub message_id: String,
    pub room: String,
    pub text: String,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestStatusChange {
    pub test_id: String,
    pub test_name: Option<String>,
    pub previous_status: Option<String>,
    pub status: String,
    pub elapsed_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemMessage {
    pub content: String,
}

/// Payload of a queued event. Pings never reach the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    UserMessage(UserMessage),
    TestStatusChange(TestStatusChange),
    SystemMessage(SystemMessage),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::UserMessage(_) => EventKind::UserMessage,
            EventPayload::TestStatusChange(_) => EventKind::TestStatusChange,
            EventPayload::SystemMessage(_) => EventKind::SystemMessage,
        }
    }

    pub fn as_user_message(&self) -> Option<&UserMessage> {
        match self {
            EventPayload::UserMessage(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    UserMessage,
    TestStatusChange,
    SystemMessage,
    Ping,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UserMessage => "user_message",
            EventKind::TestStatusChange => "test_status_change",
            EventKind::SystemMessage => "system_message",
            EventKind::Ping => "ping",
        }
    }

    /// Kinds that warrant the agent's attention.
    pub fn is_actionable(&self) -> bool {
        matches!(self, EventKind::UserMessage | EventKind::TestStatusChange)
    }
}

/// A queued event with its process-local sequence id.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub sequence_id: u64,
    pub received_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Result of sniffing one record from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Ping { room: String, id: Option<String> },
    Queued(EventPayload),
}

fn str_field<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn display_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Classify a decoded stream record by its fields.
///
/// Records matching no known shape yield `None` and are ignored.
pub fn classify(record: &Map<String, Value>) -> Option<InboundEvent> {
    if let Some(marker) = str_field(record, "_type_")
        && marker.to_ascii_lowercase().contains("ping")
        && let Some(room) = str_field(record, "room")
    {
        return Some(InboundEvent::Ping {
            room: room.to_string(),
            id: display_field(record, "id").or_else(|| display_field(record, "messageId")),
        });
    }

    if str_field(record, "sender") == Some("user")
        && str_field(record, "status") == Some("processing")
        && let Some(text) = str_field(record, "text").filter(|t| !t.is_empty())
    {
        let message_id = display_field(record, "messageId").or_else(|| display_field(record, "id"))?;
        return Some(InboundEvent::Queued(EventPayload::UserMessage(UserMessage {
            message_id,
            room: str_field(record, "room").unwrap_or_default().to_string(),
            text: text.to_string(),
            status: MessageStatus::Processing,
        })));
    }

    if str_field(record, "type") == Some("test_status_change") {
        return Some(InboundEvent::Queued(EventPayload::TestStatusChange(
            TestStatusChange {
                test_id: display_field(record, "testId").unwrap_or_default(),
                test_name: display_field(record, "testName"),
                previous_status: display_field(record, "previousStatus"),
                status: display_field(record, "status").unwrap_or_else(|| "unknown".to_string()),
                elapsed_time: display_field(record, "elapsedTime"),
            },
        )));
    }

    None
}

//! # Outbound Notifier
//!
//! Sends messages to a room on the remote side. Every message is wrapped in an
//! envelope carrying the room, an ISO-8601 timestamp and a default sender of
//! `"ai"`, and is posted to `{api_url}/api/zmq/send` as `{room, message, key}`.
//!
//! Three shapes sit on top of [`OutboundNotifier::send`]:
//!
//! - plain text (`_type_: PLAIN`)
//! - task lists (`_type_: TaskList`), whose id is generated once per room so
//!   later updates replace the same list in the UI
//! - command notifications (`_type_: CommandNotification`)
//!
//! Acknowledgements and heartbeats are best-effort: they return a [`Delivery`]
//! and log failures instead of propagating them.

use crate::event_bus::types::UserMessage;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Notify endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Base URL cannot carry a path: {0}")]
    InvalidBaseUrl(String),
}

/// Body posted to the notify endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifyBody {
    pub room: String,
    pub message: Map<String, Value>,
    pub key: String,
}

/// Delivers one envelope to the remote side.
#[async_trait]
pub trait NotifyTransport: Send + Sync {
    async fn post(&self, body: NotifyBody) -> Result<(), NotifyError>;
}

/// Posts envelopes to `{api_url}/api/zmq/send` with bearer auth.
pub struct HttpNotifyTransport {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
}

impl HttpNotifyTransport {
    pub fn new(
        api_url: &Url,
        token: impl Into<String>,
        user_agent: &str,
    ) -> Result<Self, NotifyError> {
        let mut endpoint = api_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| NotifyError::InvalidBaseUrl(api_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "zmq", "send"]);

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            token: token.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl NotifyTransport for HttpNotifyTransport {
    async fn post(&self, body: NotifyBody) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status,
                body: error_message_from_body(&text),
            });
        }
        Ok(())
    }
}

/// Prefer the `error`/`message` field of a JSON error body, else the raw text.
fn error_message_from_body(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map
            .get("error")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| text.to_string()),
        _ => text.to_string(),
    }
}

/// Outcome of a best-effort send.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }

    fn logged<T>(what: &str, room: &str, result: Result<T, NotifyError>) -> Self {
        match result {
            Ok(_) => Delivery::Delivered,
            Err(e) => {
                warn!("Best-effort {} to room '{}' failed: {}", what, room, e);
                Delivery::Failed(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    #[serde(alias = "running")]
    InProgress,
    #[serde(alias = "done")]
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    Running,
    Success,
    Failed,
}

/// Build the envelope for `payload` addressed to `room`.
///
/// Returns the message id together with the envelope. The id is taken from the
/// payload's `id` or `messageId` when present, otherwise generated, and is
/// written back after the payload is merged so both fields always agree.
pub fn build_envelope(room: &str, payload: Map<String, Value>) -> (String, Map<String, Value>) {
    let id = ["id", "messageId"]
        .iter()
        .find_map(|key| match payload.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut envelope = Map::new();
    envelope.insert("room".to_string(), json!(room));
    envelope.insert(
        "timestamp".to_string(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    envelope.insert("sender".to_string(), json!("ai"));
    envelope.extend(payload);
    envelope.insert("id".to_string(), json!(id));
    envelope.insert("messageId".to_string(), json!(id));
    (id, envelope)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub struct OutboundNotifier {
    transport: Arc<dyn NotifyTransport>,
    task_lists: Mutex<HashMap<String, String>>,
    requires_send_to_ui: AtomicBool,
}

impl OutboundNotifier {
    pub fn new(transport: Arc<dyn NotifyTransport>) -> Self {
        Self {
            transport,
            task_lists: Mutex::new(HashMap::new()),
            requires_send_to_ui: AtomicBool::new(false),
        }
    }

    /// Wrap `payload` in an envelope and post it. Returns the message id.
    pub async fn send(
        &self,
        room: &str,
        payload: Map<String, Value>,
    ) -> Result<String, NotifyError> {
        let (id, message) = build_envelope(room, payload);
        debug!("Sending message {} to room '{}'", id, room);
        self.transport
            .post(NotifyBody {
                room: room.to_string(),
                message,
                key: id.clone(),
            })
            .await?;
        Ok(id)
    }

    pub async fn send_plain(&self, room: &str, text: &str) -> Result<String, NotifyError> {
        let id = self
            .send(room, object(json!({"_type_": "PLAIN", "text": text})))
            .await?;
        self.set_requires_send_to_ui(false);
        Ok(id)
    }

    /// Publish or replace the room's task list.
    pub async fn send_task_list(
        &self,
        room: &str,
        tasks: &[TaskItem],
        text: Option<&str>,
    ) -> Result<String, NotifyError> {
        let list_id = self.task_list_id(room);
        let mut payload = object(json!({
            "_type_": "TaskList",
            "id": list_id,
            "tasks": tasks,
        }));
        if let Some(text) = text {
            payload.insert("text".to_string(), json!(text));
        }
        let id = self.send(room, payload).await?;
        self.set_requires_send_to_ui(false);
        Ok(id)
    }

    pub async fn send_command_notification(
        &self,
        room: &str,
        command: &str,
        state: CommandState,
        text: Option<&str>,
    ) -> Result<String, NotifyError> {
        let mut payload = object(json!({
            "_type_": "CommandNotification",
            "command": command,
            "state": state,
        }));
        if let Some(text) = text {
            payload.insert("text".to_string(), json!(text));
        }
        self.send(room, payload).await
    }

    /// Tell the UI a user message has been picked up.
    pub async fn mark_processed(&self, message: &UserMessage) -> Delivery {
        let payload = object(json!({
            "id": message.message_id,
            "sender": "user",
            "text": message.text,
            "status": "processed",
        }));
        let result = self.send(&message.room, payload).await;
        Delivery::logged("acknowledgement", &message.room, result)
    }

    pub async fn acknowledge_ping(&self, room: &str, id: Option<&str>) -> Delivery {
        let mut payload = object(json!({"_type_": "Pong", "status": "processed"}));
        if let Some(id) = id {
            payload.insert("id".to_string(), json!(id));
        }
        let result = self.send(room, payload).await;
        Delivery::logged("ping acknowledgement", room, result)
    }

    pub async fn heartbeat(&self, room: &str) -> Delivery {
        let payload = object(json!({"_type_": "Heartbeat", "status": "listening"}));
        let result = self.send(room, payload).await;
        Delivery::logged("heartbeat", room, result)
    }

    /// Stable task-list id for `room`, created on first use.
    pub fn task_list_id(&self, room: &str) -> String {
        let mut lists = self
            .task_lists
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        lists
            .entry(room.to_string())
            .or_insert_with(|| format!("tasklist-{}", uuid::Uuid::new_v4()))
            .clone()
    }

    pub fn requires_send_to_ui(&self) -> bool {
        self.requires_send_to_ui.load(Ordering::SeqCst)
    }

    pub fn set_requires_send_to_ui(&self, required: bool) {
        self.requires_send_to_ui.store(required, Ordering::SeqCst);
    }
}

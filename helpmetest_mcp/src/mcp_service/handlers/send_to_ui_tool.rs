use super::common;
use crate::mcp_service::HelpMeTestService;
use crate::notifier::{CommandState, TaskItem};
use rmcp::model::{CallToolResult, ErrorData as McpError};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Message shape requested through `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMessageType {
    Plain,
    Tasks,
    Command,
}

impl UiMessageType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "plain" | "text" => Some(Self::Plain),
            "tasks" | "tasklist" | "task_list" => Some(Self::Tasks),
            "command" => Some(Self::Command),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Tasks => "tasks",
            Self::Command => "command",
        }
    }
}

impl HelpMeTestService {
    pub fn generate_input_schema_for_send_to_ui(&self) -> Arc<Map<String, Value>> {
        let mut properties = Map::new();
        properties.insert(
            "room".to_string(),
            json!({
                "type": "string",
                "description": format!(
                    "Target room: chat.{} or a room returned by start_interactive_session",
                    self.bus.company()
                )
            }),
        );
        properties.insert(
            "message".to_string(),
            json!({"type": "string", "description": "Text to show in the UI"}),
        );
        properties.insert(
            "type".to_string(),
            json!({
                "type": "string",
                "enum": ["plain", "tasks", "command"],
                "description": "Message shape (default: tasks when tasks are given, otherwise plain)"
            }),
        );
        properties.insert(
            "tasks".to_string(),
            json!({
                "type": "array",
                "description": "Task list; replaces the room's current list",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "status": {
                            "type": "string",
                            "enum": ["pending", "in_progress", "completed", "failed"]
                        }
                    },
                    "required": ["title"]
                }
            }),
        );
        properties.insert(
            "command".to_string(),
            json!({"type": "string", "description": "Command line, for type=command"}),
        );
        properties.insert(
            "state".to_string(),
            json!({
                "type": "string",
                "enum": ["running", "success", "failed"],
                "description": "Command state, for type=command (default running)"
            }),
        );
        Arc::new(common::object_schema(properties, &["room"]))
    }

    fn room_error(&self, error: String) -> CallToolResult {
        common::error_result(json!({
            "success": false,
            "error": error,
            "availableRooms": self.bus.available_rooms(),
        }))
    }

    fn tool_error(error: &str) -> CallToolResult {
        common::error_result(json!({"success": false, "error": error}))
    }

    /// Handles the 'send_to_ui' tool call.
    pub async fn handle_send_to_ui(
        &self,
        args: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        let Some(room) = common::optional_str(&args, "room") else {
            return Ok(self.room_error("Missing required argument: room".to_string()));
        };
        if !self.bus.is_valid_room(room) {
            return Ok(self.room_error(format!("Invalid room '{room}'")));
        }

        let message = common::optional_str(&args, "message");
        let tasks: Option<Vec<TaskItem>> = match args.get("tasks") {
            None | Some(Value::Null) => None,
            Some(value) => Some(serde_json::from_value(value.clone()).map_err(|e| {
                McpError::invalid_params(format!("Invalid 'tasks' argument: {e}"), None)
            })?),
        };
        if message.is_none() && tasks.is_none() {
            return Ok(Self::tool_error(
                "Provide at least one of 'message' or 'tasks'",
            ));
        }

        let kind = match common::optional_str(&args, "type") {
            Some(raw) => match UiMessageType::parse(raw) {
                Some(kind) => kind,
                None => {
                    return Ok(Self::tool_error(&format!(
                        "Unknown type '{raw}'; expected plain, tasks or command"
                    )));
                }
            },
            None if tasks.is_some() => UiMessageType::Tasks,
            None => UiMessageType::Plain,
        };

        let notifier = self.bus.notifier();
        let sent = match kind {
            UiMessageType::Plain => {
                let Some(text) = message else {
                    return Ok(Self::tool_error("type 'plain' requires 'message'"));
                };
                notifier.send_plain(room, text).await
            }
            UiMessageType::Tasks => {
                let Some(tasks) = tasks.as_deref() else {
                    return Ok(Self::tool_error("type 'tasks' requires 'tasks'"));
                };
                notifier.send_task_list(room, tasks, message).await
            }
            UiMessageType::Command => {
                let Some(command) = common::optional_str(&args, "command").or(message) else {
                    return Ok(Self::tool_error(
                        "type 'command' requires 'command' or 'message'",
                    ));
                };
                let state = match common::optional_str(&args, "state") {
                    None => CommandState::Running,
                    Some(raw) => match serde_json::from_value(json!(raw.to_ascii_lowercase())) {
                        Ok(state) => state,
                        Err(_) => {
                            return Ok(Self::tool_error(&format!(
                                "Unknown state '{raw}'; expected running, success or failed"
                            )));
                        }
                    },
                };
                notifier
                    .send_command_notification(room, command, state, message)
                    .await
            }
        };

        match sent {
            Ok(id) => Ok(common::json_result(json!({
                "success": true,
                "message": format!("Message sent to {room}"),
                "type": kind.as_str(),
                "id": id,
            }))),
            Err(e) => {
                tracing::warn!("send_to_ui to '{}' failed: {}", room, e);
                Ok(Self::tool_error(&format!("Failed to send to UI: {e}")))
            }
        }
    }
}

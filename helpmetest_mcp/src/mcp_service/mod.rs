//! # HelpMeTest MCP Service
//!
//! `HelpMeTestService` implements `rmcp::ServerHandler` on top of a shared
//! [`EventBus`]. It exposes four tools:
//!
//! - **`listen_to_events`**: every new event since the last call, any kind.
//! - **`get_pending_messages`**: only user chat messages, removed on delivery.
//! - **`send_to_ui`**: plain text, task list or command notification to a room.
//! - **`start_interactive_session`**: opens a new interactive room.
//!
//! Invalid rooms and missing arguments are returned as tool results with
//! `is_error` set, listing the rooms the caller may use. Unknown tool names
//! and malformed argument types are protocol errors.

mod handlers;

use crate::event_bus::EventBus;
use rmcp::{
    handler::server::ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, ErrorData as McpError, Implementation,
        ListToolsResult, PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo,
        Tool, ToolsCapability,
    },
    service::{RequestContext, RoleServer},
};
use std::sync::Arc;

const INSTRUCTIONS: &str = "Bridge between this agent and the HelpMeTest UI. \
Call listen_to_events in a loop to receive user messages and test status changes, \
answer users with send_to_ui in the room the message came from, and use \
start_interactive_session to open a dedicated room for a longer task.";

#[derive(Clone)]
pub struct HelpMeTestService {
    pub bus: Arc<EventBus>,
}

impl HelpMeTestService {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Every tool this server offers.
    pub fn tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "listen_to_events".into(),
                title: Some("Listen to events".to_string()),
                icons: None,
                description: Some("Wait up to `wait` milliseconds for new events (user messages, test status changes, system messages) and return every event received since the previous call. Returns as soon as anything arrives. Call it again after handling the result to keep listening.".into()),
                input_schema: self.generate_input_schema_for_listen_to_events(),
                output_schema: None,
                annotations: None,
                meta: None,
            },
            Tool {
                name: "get_pending_messages".into(),
                title: Some("Get pending messages".to_string()),
                icons: None,
                description: Some("Wait up to `wait` milliseconds for user chat messages and return them. Only user messages are returned and they are removed from the queue; other events stay queued for listen_to_events.".into()),
                input_schema: self.generate_input_schema_for_get_pending_messages(),
                output_schema: None,
                annotations: None,
                meta: None,
            },
            Tool {
                name: "send_to_ui".into(),
                title: Some("Send to UI".to_string()),
                icons: None,
                description: Some("Send a message to a HelpMeTest room. `type` is `plain` (default without tasks), `tasks` (default with tasks; replaces the room's task list) or `command` (command progress). At least one of `message` or `tasks` is required, and `room` must be one of the available rooms.".into()),
                input_schema: self.generate_input_schema_for_send_to_ui(),
                output_schema: None,
                annotations: None,
                meta: None,
            },
            Tool {
                name: "start_interactive_session".into(),
                title: Some("Start interactive session".to_string()),
                icons: None,
                description: Some("Open a new interactive room for this agent and return its name. Send progress to it with send_to_ui before continuing.".into()),
                input_schema: self.generate_input_schema_for_start_interactive_session(),
                output_schema: None,
                annotations: None,
                meta: None,
            },
        ]
    }
}

#[allow(clippy::manual_async_fn)] // Required by rmcp ServerHandler trait
impl ServerHandler for HelpMeTestService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                title: Some("HelpMeTest".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: Some("https://helpmetest.com".to_string()),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(ListToolsResult {
                tools: self.tools(),
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move { self.dispatch(params).await }
    }
}

impl HelpMeTestService {
    /// Route a tool call by name.
    pub async fn dispatch(&self, params: CallToolRequestParams) -> Result<CallToolResult, McpError> {
        let args = params.arguments.unwrap_or_default();
        tracing::debug!("Tool call: {}", params.name);
        match params.name.as_ref() {
            "listen_to_events" => self.handle_listen_to_events(args).await,
            "get_pending_messages" => self.handle_get_pending_messages(args).await,
            "send_to_ui" => self.handle_send_to_ui(args).await,
            "start_interactive_session" => self.handle_start_interactive_session(args).await,
            other => Err(McpError::invalid_params(
                format!("Unknown tool: {other}"),
                None,
            )),
        }
    }
}

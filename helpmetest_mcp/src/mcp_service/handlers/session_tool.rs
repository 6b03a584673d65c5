use super::common;
use crate::mcp_service::HelpMeTestService;
use rmcp::model::{CallToolResult, ErrorData as McpError};
use serde_json::{Map, Value, json};
use std::sync::Arc;

impl HelpMeTestService {
    pub fn generate_input_schema_for_start_interactive_session(&self) -> Arc<Map<String, Value>> {
        Arc::new(common::object_schema(Map::new(), &[]))
    }

    /// Handles the 'start_interactive_session' tool call.
    pub async fn handle_start_interactive_session(
        &self,
        _args: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.bus.open_interactive_session();
        tracing::info!("Opened interactive session {}", session.room);
        Ok(common::json_result(json!({
            "success": true,
            "room": session.room,
            "timestamp": session.timestamp,
            "availableRooms": session.available_rooms,
            "message": "Interactive session started. Send a first update to this room with send_to_ui.",
        })))
    }
}

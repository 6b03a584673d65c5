use super::common;
use crate::mcp_service::HelpMeTestService;
use rmcp::model::{CallToolResult, ErrorData as McpError};
use serde_json::{Map, Value};
use std::sync::Arc;

impl HelpMeTestService {
    pub fn generate_input_schema_for_get_pending_messages(&self) -> Arc<Map<String, Value>> {
        let default = self.bus.settings().pending_default_wait.as_millis();
        let mut properties = Map::new();
        properties.insert("wait".to_string(), common::wait_property(default));
        Arc::new(common::object_schema(properties, &[]))
    }

    /// Handles the 'get_pending_messages' tool call.
    pub async fn handle_get_pending_messages(
        &self,
        args: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        let settings = self.bus.settings();
        let wait = settings.clamp_wait(common::parse_wait_ms(&args)?, settings.pending_default_wait);
        let outcome = self.bus.get_pending_messages(wait).await;
        Ok(common::text_result(outcome.render()))
    }
}

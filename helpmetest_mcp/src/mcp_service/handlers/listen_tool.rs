use super::common;
use crate::mcp_service::HelpMeTestService;
use rmcp::model::{CallToolResult, ErrorData as McpError};
use serde_json::{Map, Value};
use std::sync::Arc;

impl HelpMeTestService {
    pub fn generate_input_schema_for_listen_to_events(&self) -> Arc<Map<String, Value>> {
        let default = self.bus.settings().listen_default_wait.as_millis();
        let mut properties = Map::new();
        properties.insert("wait".to_string(), common::wait_property(default));
        Arc::new(common::object_schema(properties, &[]))
    }

    /// Handles the 'listen_to_events' tool call.
    pub async fn handle_listen_to_events(
        &self,
        args: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        let settings = self.bus.settings();
        let wait = settings.clamp_wait(common::parse_wait_ms(&args)?, settings.listen_default_wait);
        let outcome = self.bus.listen_to_events(wait).await;
        Ok(common::text_result(outcome.render()))
    }
}

//! # HelpMeTest MCP
//!
//! An MCP server that connects an AI agent to the HelpMeTest platform.
//!
//! Events from the platform's stream (user chat messages, test status
//! changes) are buffered in a bounded [`event_bus::EventBus`] and handed to
//! the agent through two blocking tools:
//!
//! - `get_pending_messages` removes and returns user messages only.
//! - `listen_to_events` returns everything since the previous call.
//!
//! Replies go back through `send_to_ui`, which posts plain text, task lists
//! or command notifications to a room. Heartbeats are sent while the agent
//! is waiting so the UI can show that it is listening.
//!
//! ## Modules
//!
//! - **`config`**: API settings from flags and `HELPMETEST_*` variables.
//! - **`auth`**: resolves the active company for the token.
//! - **`event_bus`**: queue, cursor, sessions and the stream supervisor.
//! - **`notifier`**: outbound posts to the platform.
//! - **`heartbeat`**: periodic "listening" notifications.
//! - **`mcp_service`**: the `rmcp` server handler and tool definitions.
//! - **`shell`**: the `helpmetest` binary.

pub mod auth;
pub mod config;
pub mod event_bus;
pub mod heartbeat;
pub mod mcp_service;
pub mod notifier;
pub mod retry;
pub mod shell;
pub mod test_utils;
pub mod utils;

pub use mcp_service::HelpMeTestService;

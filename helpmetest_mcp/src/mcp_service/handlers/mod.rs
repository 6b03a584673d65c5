mod common;
mod listen_tool;
mod pending_tool;
mod send_to_ui_tool;
mod session_tool;

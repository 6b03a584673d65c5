//! # Modes
//!
//! What each `helpmetest` subcommand runs.

pub mod server;

pub use server::run_server_mode;

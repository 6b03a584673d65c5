//! # Shell Module
//!
//! Entry point and CLI logic for the `helpmetest` binary.
//!
//! - **`cli`**: argument parsing and subcommand dispatch
//! - **`modes`**: what each subcommand runs

pub mod cli;
pub mod modes;

pub use cli::run;

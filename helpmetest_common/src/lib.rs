//! Shared building blocks for the helpmetest crates.

/// Observable lifecycle state for supervised background tasks.
pub mod task_state;

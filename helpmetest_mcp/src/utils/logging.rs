//! # Logging Initialization
//!
//! `init_logging()` installs the global `tracing` subscriber once per process
//! (guarded by `std::sync::Once`).
//!
//! - **Filter**: `RUST_LOG` when set, otherwise `"{level},helpmetest_mcp=debug"`.
//! - **File (default)**: a daily rolling `helpmetest.log` in the user cache
//!   directory, written through a non-blocking appender, ANSI off.
//! - **Stderr**: used when `log_to_file` is false or the cache directory is not
//!   writable, ANSI on.
//!
//! Nothing is ever logged to stdout: it carries the MCP stdio transport.

use anyhow::Result;
use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// Log file name prefix inside the cache directory.
pub const LOG_FILE_NAME: &str = "helpmetest.log";

/// Initialize verbose logging for tests (`trace` level, stderr).
pub fn init_test_logging() {
    let _ = init_logging("trace", false);
}

/// Default filter directive when `RUST_LOG` is unset.
pub fn default_filter(log_level: &str) -> String {
    format!("{log_level},helpmetest_mcp=debug")
}

/// Directory holding the rolling log files, if the platform has one.
pub fn log_directory() -> Option<std::path::PathBuf> {
    ProjectDirs::from("com", "HelpMeTest", "helpmetest").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

        if log_to_file
            && let Some(log_dir) = log_directory()
            && test_write_permission(&log_dir)
        {
            // tracing_appender::rolling::daily panics on some permission errors.
            let appender = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME)
            }));
            if let Ok(file_appender) = appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .init();
                // Leaked so buffered lines are flushed for the whole process lifetime.
                Box::leak(Box::new(guard));
                return;
            }
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });

    Ok(())
}

/// Creates `dir` if needed and checks a file can be written in it.
pub fn test_write_permission(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".helpmetest_log_test");
    match std::fs::write(&probe, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

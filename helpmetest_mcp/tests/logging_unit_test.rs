//! Tests for utils/logging.rs.
//!
//! The global subscriber can only be installed once per process, so these
//! tests cover the pieces around it rather than switching sinks.

use helpmetest_mcp::utils::logging::{
    LOG_FILE_NAME, default_filter, init_logging, log_directory, test_write_permission,
};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_filter_keeps_crate_at_debug() {
    assert_eq!(default_filter("info"), "info,helpmetest_mcp=debug");
    assert_eq!(default_filter("warn"), "warn,helpmetest_mcp=debug");
}

#[test]
fn test_write_permission_creates_missing_directory() {
    let temp = tempdir().unwrap();
    let nested = temp.path().join("logs").join("helpmetest");
    assert!(test_write_permission(&nested));
    assert!(nested.is_dir());
    assert_eq!(fs::read_dir(&nested).unwrap().count(), 0, "probe file is removed");
}

#[cfg(unix)]
#[test]
fn test_write_permission_fails_for_read_only_directory() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().unwrap();
    let locked = temp.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    // Root ignores permission bits, so only check when the probe really fails.
    if fs::write(locked.join("x"), "x").is_err() {
        assert!(!test_write_permission(&locked));
    }
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_log_directory_is_app_specific() {
    if let Some(dir) = log_directory() {
        assert!(dir.to_string_lossy().to_lowercase().contains("helpmetest"));
    }
    assert_eq!(LOG_FILE_NAME, "helpmetest.log");
}

#[test]
fn test_init_logging_is_idempotent() {
    assert!(init_logging("info", false).is_ok());
    assert!(init_logging("debug", false).is_ok());
}

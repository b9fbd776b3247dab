//! Tests for paths module.

use super::*;
use serial_test::serial;
use std::env;
use tempfile::tempdir;

#[test]
fn test_sanitize_keeps_plain_ids() {
    assert_eq!(sanitize("abc123"), "abc123");
    assert_eq!(
        sanitize("5f0c2a8e-1b7d-4c3e-9a61-0d2f4e8b7c90"),
        "5f0c2a8e-1b7d-4c3e-9a61-0d2f4e8b7c90"
    );
}

#[test]
fn test_sanitize_blocks_traversal() {
    assert_eq!(sanitize("../../etc"), "______etc");
    assert_eq!(sanitize("a/b"), "a_b");
    assert_eq!(sanitize(""), "unnamed");
}

#[test]
#[serial]
fn test_home_override() {
    let dir = tempdir().unwrap();
    let custom = dir.path().join("monitor-home");
    env::set_var(HOME_ENV, &custom);

    let home = monitor_home_dir();
    let logs = logs_dir();
    let debug = debug_log_path();
    let session = session_logs_dir("abc123");
    let config = config_path();
    env::remove_var(HOME_ENV);

    assert_eq!(home.unwrap(), custom);
    assert_eq!(logs.unwrap(), custom.join("logs"));
    assert_eq!(debug.unwrap(), custom.join("logs").join("debug.log"));
    let session = session.unwrap();
    assert_eq!(session, custom.join("logs").join("sessions").join("abc123"));
    assert!(session.is_dir());
    let config = config.unwrap();
    assert_eq!(config, custom.join("config.yaml"));
    assert!(!config.exists());
}

#[test]
#[serial]
fn test_default_home_dir() {
    if env::var("HOME").is_err() || env::var_os(HOME_ENV).is_some() {
        return;
    }

    let path = monitor_home_dir().unwrap();
    assert!(path.ends_with(".sdlc-monitor"));
}

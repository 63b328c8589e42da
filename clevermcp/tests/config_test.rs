//! Tests for config module

use clevermcp::config::{expand_tilde, Config};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.server.bind_addr, "127.0.0.1:8787");
    assert!(!config.server.tls.enabled);
    assert_eq!(config.mcp.protocol_version, "2024-11-05");
    assert_eq!(config.mcp.server_name, "CleverMCP");
    assert_eq!(config.mcp.keep_alive_interval(), Duration::from_secs(30));
    assert_eq!(config.clever.base_url, "https://api.clever.com/v3.0");
    assert!(config.clever.token.is_none());
    assert_eq!(config.clever.token_env, "CLEVER_API_TOKEN");
    assert!(config.observability.metrics_addr.is_none());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_expand_tilde() {
    let home = dirs::home_dir().unwrap();

    let expanded = expand_tilde(&PathBuf::from("~/devices.db")).unwrap();
    assert_eq!(expanded, home.join("devices.db"));

    let expanded = expand_tilde(&PathBuf::from("/var/lib/devices.db")).unwrap();
    assert_eq!(expanded, PathBuf::from("/var/lib/devices.db"));
}

#[test]
fn test_save_and_load() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("clevermcp.toml");

    let mut config = Config::default();
    config.server.bind_addr = "0.0.0.0:9999".to_string();
    config.mcp.keep_alive_secs = 15;
    config.clever.timeout_ms = 2500;
    config.devices.db_path = PathBuf::from("/srv/devices.db");

    config.save(&config_path).unwrap();

    let loaded = Config::load_or_create(&config_path).unwrap();
    assert_eq!(loaded.server.bind_addr, "0.0.0.0:9999");
    assert_eq!(loaded.mcp.keep_alive_secs, 15);
    assert_eq!(loaded.clever.timeout(), Duration::from_millis(2500));
    assert_eq!(loaded.devices.db_path, PathBuf::from("/srv/devices.db"));
}

#[test]
fn test_load_or_create_writes_default() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("conf/clevermcp.toml");

    let config = Config::load_or_create(&config_path).unwrap();
    assert_eq!(config.server.bind_addr, "127.0.0.1:8787");
    assert!(config_path.exists());

    let written = std::fs::read_to_string(&config_path).unwrap();
    assert!(written.contains("[mcp]"));
    // An unset token is never written out
    assert!(!written.contains("token ="));
}

#[test]
fn test_partial_file_uses_defaults() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("clevermcp.toml");
    std::fs::write(
        &config_path,
        "[mcp]\nkeep_alive_secs = 5\n\n[clever]\nbase_url = \"http://localhost:9000/v3.0\"\n",
    )
    .unwrap();

    let config = Config::load_or_create(&config_path).unwrap();
    assert_eq!(config.mcp.keep_alive_secs, 5);
    assert_eq!(config.mcp.server_name, "CleverMCP");
    assert_eq!(config.clever.base_url, "http://localhost:9000/v3.0");
    assert_eq!(config.clever.timeout_ms, 10_000);
}

#[test]
fn test_token_resolution() {
    let mut config = Config::default();
    config.clever.token_env = "CLEVERMCP_TEST_TOKEN_RESOLUTION".to_string();

    std::env::remove_var(&config.clever.token_env);
    assert_eq!(config.clever.resolve_token(), None);

    std::env::set_var(&config.clever.token_env, "from-env");
    assert_eq!(config.clever.resolve_token().as_deref(), Some("from-env"));

    config.clever.token = Some("from-file".to_string());
    assert_eq!(config.clever.resolve_token().as_deref(), Some("from-file"));

    std::env::remove_var(&config.clever.token_env);
}

#[test]
fn test_log_filter_precedence() {
    let mut config = Config::default();
    assert_eq!(config.log_filter(), "info");

    config.logging.level = "warn".to_string();
    assert_eq!(config.log_filter(), "warn");

    config.observability.log_level = Some("info,clevermcp=debug".to_string());
    assert_eq!(config.log_filter(), "info,clevermcp=debug");
}

#[test]
fn test_logging_level_from_file() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("clevermcp.toml");
    std::fs::write(&config_path, "[logging]\nlevel = \"debug\"\n").unwrap();

    let config = Config::load_or_create(&config_path).unwrap();
    assert!(config.observability.log_level.is_none());
    assert_eq!(config.log_filter(), "debug");
}

#[test]
fn test_invalid_toml_is_error() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("clevermcp.toml");
    std::fs::write(&config_path, "[server\nbind_addr = ").unwrap();

    assert!(Config::load_or_create(&config_path).is_err());
}

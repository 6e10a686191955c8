use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use Seldex::core::config::{BackendKind, Config};
use Seldex::core::error::ErrorKind;
use Seldex::storage::journal::SyncMode;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.backend, BackendKind::Relational);
    assert!(!config.in_memory);
    assert!(config.max_connections >= 1);
    assert_eq!(config.acquire_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.execute_timeout(), None);
    assert!(!config.like_falls_back_to_equal);
    assert_eq!(config.journal_sync, SyncMode::Batch);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = Config::from_toml(
        r#"
        backend = "document"
        storage_path = "/var/lib/seldex"
        execute_timeout_ms = 250
        journal_sync = "immediate"
        "#,
    )
    .unwrap();

    assert_eq!(config.backend, BackendKind::Document);
    assert_eq!(config.storage_path.to_str(), Some("/var/lib/seldex"));
    assert_eq!(config.execute_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(config.journal_sync, SyncMode::Immediate);
    assert_eq!(config.busy_timeout(), Duration::from_secs(5));
}

#[test]
fn test_zero_acquire_timeout_waits_forever() {
    let config = Config::from_toml("acquire_timeout_ms = 0").unwrap();
    assert_eq!(config.acquire_timeout(), None);
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seldex.toml");
    fs::write(&path, "max_connections = 3\nlike_falls_back_to_equal = true\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.max_connections, 3);
    assert!(config.like_falls_back_to_equal);
}

#[test]
fn test_invalid_config() {
    assert_eq!(Config::from_toml("backend = \"graph\"").unwrap_err().kind, ErrorKind::Parse);
    assert_eq!(Config::from_toml("max_connections = \"many\"").unwrap_err().kind, ErrorKind::Parse);

    let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Io);
}

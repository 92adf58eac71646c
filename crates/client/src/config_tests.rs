// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[test]
fn default_timings() {
    let config = SessionConfig::default();
    assert_eq!(config.url, "ws://127.0.0.1:8000/ws/row-count");
    assert_eq!(config.max_reconnect_attempts, 5);
    assert_eq!(config.reconnect_base_delay(), Duration::from_secs(1));
    assert_eq!(config.heartbeat_interval(), Duration::from_secs(25));
    assert_eq!(config.heartbeat_timeout(), Duration::from_secs(30));
    assert_eq!(config.connect_timeout(), Duration::from_secs(10));
}

#[test]
fn partial_toml_uses_defaults() {
    let config = SessionConfig::from_toml(
        r#"
url = "wss://paste.example.com/ws"
heartbeat_interval_ms = 1000
"#,
    )
    .unwrap();

    assert_eq!(config.url, "wss://paste.example.com/ws");
    assert_eq!(config.heartbeat_interval_ms, 1000);
    assert_eq!(config.heartbeat_timeout_ms, 30_000);
    assert_eq!(config.max_reconnect_attempts, 5);
}

#[parameterized(
    http_url = { "url = \"http://localhost:8000\"" },
    zero_interval = { "heartbeat_interval_ms = 0" },
    zero_timeout = { "heartbeat_timeout_ms = 0" },
    bad_type = { "max_reconnect_attempts = \"five\"" },
)]
fn invalid_toml_is_rejected(content: &str) {
    let err = SessionConfig::from_toml(content).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.toml");
    std::fs::write(&path, "url = \"ws://10.0.0.2:9000/ws\"\nmax_reconnect_attempts = 2\n").unwrap();

    let config = SessionConfig::load(&path).unwrap();
    assert_eq!(config, SessionConfig {
        max_reconnect_attempts: 2,
        ..SessionConfig::new("ws://10.0.0.2:9000/ws")
    });
}

#[test]
fn load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SessionConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

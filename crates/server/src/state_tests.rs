// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;

fn state() -> ServerState {
    ServerState::new(TextStore::open_in_memory().unwrap(), TimeDelta::hours(24))
}

#[tokio::test]
async fn save_stores_and_broadcasts_count() {
    let state = state();
    let mut rx = state.subscribe();

    let id = state.save("hello", " ab ", "AB", Some("10.0.0.1")).await.unwrap();
    assert_eq!(id.len(), 4);
    assert_eq!(state.count().await.unwrap(), 1);
    assert_eq!(rx.recv().await.unwrap(), ServerMessage::count_update(1));

    state.save("again", "xy", "XY", None).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), ServerMessage::count_update(2));
}

#[tokio::test]
async fn save_checks_length_before_captcha() {
    let state = state();
    let mut rx = state.subscribe();
    let long = "a".repeat(MAX_CONTENT_LEN + 1);

    let err = state.save(&long, "no", "AB", None).await.unwrap_err();
    assert!(matches!(err, RequestError::ContentTooLong));
    assert_eq!(err.to_string(), "Text exceeds allowed length.");

    let err = state.save("short", "no", "AB", None).await.unwrap_err();
    assert!(matches!(err, RequestError::CaptchaMismatch));

    assert_eq!(state.count().await.unwrap(), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn length_limit_counts_characters() {
    let state = state();
    let content = "é".repeat(MAX_CONTENT_LEN);
    assert!(state.save(&content, "AB", "AB", None).await.is_ok());
}

#[tokio::test]
async fn retrieve_returns_saved_content() {
    let state = state();
    let id = state.save("hello", "AB", "AB", None).await.unwrap();

    assert_eq!(state.retrieve(&id, "cd", "CD").await.unwrap(), "hello");

    let err = state.retrieve("ZZZZ", "cd", "CD").await.unwrap_err();
    assert!(matches!(err, RequestError::NotFound));
    assert_eq!(err.to_string(), "ID not found");

    let err = state.retrieve(&id, "cd", "EF").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "CAPTCHA verification failed. Please try again."
    );
}

#[tokio::test]
async fn purge_broadcasts_only_when_rows_removed() {
    let state = state();
    state.save("hello", "AB", "AB", None).await.unwrap();
    let mut rx = state.subscribe();

    assert_eq!(state.purge_expired().await.unwrap(), 0);
    assert!(rx.try_recv().is_err());

    let later = Utc::now() + TimeDelta::hours(25);
    assert_eq!(state.purge_expired_at(later).await.unwrap(), 1);
    assert_eq!(rx.recv().await.unwrap(), ServerMessage::count_update(0));
    assert_eq!(state.count().await.unwrap(), 0);
}

#[tokio::test]
async fn expired_text_is_not_retrievable() {
    let state = ServerState::new(TextStore::open_in_memory().unwrap(), TimeDelta::zero());
    let id = state.save("short lived", "AB", "AB", None).await.unwrap();
    let mut rx = state.subscribe();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let err = state.retrieve(&id, "AB", "AB").await.unwrap_err();
    assert!(matches!(err, RequestError::NotFound));
    assert_eq!(rx.recv().await.unwrap(), ServerMessage::count_update(0));
}

#[test]
fn connection_guard_tracks_active_connections() {
    let state = state();
    assert_eq!(state.active_connections(), 0);

    let first = state.connect();
    let second = state.connect();
    assert_eq!(state.active_connections(), 2);

    drop(first);
    assert_eq!(state.active_connections(), 1);
    drop(second);
    assert_eq!(state.active_connections(), 0);
}

#[test]
fn ping_limit_is_per_client() {
    let state = state();
    for _ in 0..crate::rate_limit::DEFAULT_LIMIT {
        assert!(state.allow_ping("10.0.0.1"));
    }
    assert!(state.allow_ping("10.0.0.2"));
}

#[tokio::test]
async fn open_creates_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pasty.db");
    let state = ServerState::open(&path, TimeDelta::hours(1)).unwrap();
    state.save("on disk", "AB", "AB", None).await.unwrap();
    assert!(path.exists());
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server state management.
//!
//! Wraps the text store for shared access and owns the broadcast channel
//! that fans count changes out to every connection.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use pasty_core::{captcha, ServerMessage, MAX_CONTENT_LEN};

use crate::rate_limit::RateLimiter;
use crate::store::{StoreError, TextStore};

/// Buffered broadcasts per subscriber before it starts lagging.
const BROADCAST_CAPACITY: usize = 1024;

/// Why a save or retrieve request was refused.
///
/// The display strings are what clients see.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Text exceeds allowed length.")]
    ContentTooLong,

    #[error("CAPTCHA verification failed. Please try again.")]
    CaptchaMismatch,

    #[error("ID not found")]
    NotFound,

    #[error("An error occurred. Please try again.")]
    Storage(#[from] StoreError),
}

/// Shared server state.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    /// The text store (protected by mutex for writes).
    store: Mutex<TextStore>,
    /// Broadcast channel for count changes.
    broadcast_tx: broadcast::Sender<ServerMessage>,
    /// Currently open WebSocket connections.
    connections: AtomicUsize,
    /// How long a text lives after creation.
    expiration: TimeDelta,
    /// Limiter for the `/ping` endpoint.
    ping_limiter: RateLimiter,
}

impl ServerState {
    /// Creates state around an already opened store.
    pub fn new(store: TextStore, expiration: TimeDelta) -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        ServerState {
            inner: Arc::new(ServerStateInner {
                store: Mutex::new(store),
                broadcast_tx,
                connections: AtomicUsize::new(0),
                expiration,
                ping_limiter: RateLimiter::default(),
            }),
        }
    }

    /// Opens the database at `path` and creates state around it.
    pub fn open(path: &Path, expiration: TimeDelta) -> Result<Self, StoreError> {
        Ok(ServerState::new(TextStore::open(path)?, expiration))
    }

    /// Number of stored texts.
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.inner.store.lock().await.count()
    }

    /// Validates and stores a text, then broadcasts the new count.
    ///
    /// Returns the identifier of the stored text.
    pub async fn save(
        &self,
        content: &str,
        captcha_input: &str,
        captcha_code: &str,
        ip_address: Option<&str>,
    ) -> Result<String, RequestError> {
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(RequestError::ContentTooLong);
        }
        if !captcha::matches(captcha_input, captcha_code) {
            return Err(RequestError::CaptchaMismatch);
        }

        let mut store = self.inner.store.lock().await;
        let id = store.insert(content, ip_address, Utc::now())?;
        let count = store.count()?;
        info!("Stored text {} ({} total)", id, count);

        // Publish under the lock so broadcasts follow store order
        self.publish_count(count);
        Ok(id)
    }

    /// Validates the CAPTCHA and looks up a text.
    ///
    /// Expired texts are purged first.
    pub async fn retrieve(
        &self,
        lookup_id: &str,
        captcha_input: &str,
        captcha_code: &str,
    ) -> Result<String, RequestError> {
        if !captcha::matches(captcha_input, captcha_code) {
            return Err(RequestError::CaptchaMismatch);
        }

        let now = Utc::now();
        let mut store = self.inner.store.lock().await;
        self.purge_locked(&mut store, now)?;

        match store.fetch(lookup_id, now)? {
            Some(content) => {
                debug!("Retrieved text {}", lookup_id);
                Ok(content)
            }
            None => Err(RequestError::NotFound),
        }
    }

    /// Removes texts older than the expiration, broadcasting if any were removed.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.purge_expired_at(Utc::now()).await
    }

    /// Like [`ServerState::purge_expired`] with an explicit current time.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut store = self.inner.store.lock().await;
        self.purge_locked(&mut store, now)
    }

    fn purge_locked(&self, store: &mut TextStore, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = store.purge_created_before(now - self.inner.expiration)?;
        if removed > 0 {
            let count = store.count()?;
            info!("Purged {} expired texts ({} remaining)", removed, count);
            self.publish_count(count);
        }
        Ok(removed)
    }

    fn publish_count(&self, count: u64) {
        // No receivers is fine: nobody is connected
        let receivers = self
            .inner
            .broadcast_tx
            .send(ServerMessage::count_update(count))
            .unwrap_or(0);
        debug!("Count {} broadcast to {} connections", count, receivers);
    }

    /// Subscribe to broadcast messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Registers an open connection until the guard is dropped.
    pub fn connect(&self) -> ConnectionGuard {
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            state: self.clone(),
        }
    }

    /// Number of currently open WebSocket connections.
    pub fn active_connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Records a `/ping` request from `client`. Returns false when over the limit.
    pub fn allow_ping(&self, client: &str) -> bool {
        self.inner.ping_limiter.check(client)
    }
}

/// Counts a connection as active while alive.
pub struct ConnectionGuard {
    state: ServerState,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.inner.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

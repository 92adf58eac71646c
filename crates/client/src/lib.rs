// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! pasty-client: Real-time connection manager for the pasty text drop.
//!
//! Keeps one WebSocket channel to a pasty server healthy and multiplexes
//! three things over it: an application heartbeat, the live stored-item
//! counter, and save/retrieve requests.
//!
//! # Features
//!
//! - Heartbeat ping/pong that detects half-open connections
//! - Linear reconnect backoff with a bounded attempt budget
//! - Manual and visibility-triggered reconnects
//! - Request IDs on every save/retrieve, one in flight per kind
//! - Injectable transport trait for testing
//!
//! ```no_run
//! # async fn demo() -> Result<(), pasty_client::OperationError> {
//! use pasty_client::{connect, SessionConfig};
//! use pasty_core::SavePayload;
//!
//! let session = connect(SessionConfig::default());
//! let _ = session.watch_state().wait_for(|s| s.is_connected()).await;
//!
//! let stored = session.save(SavePayload::new("hello", "AB", "AB")).await?;
//! println!("saved as {}", stored.id);
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod lifecycle;
mod router;
mod session;
mod tracker;
mod transport;

pub use config::SessionConfig;
pub use lifecycle::{Command, ConnectionState, Lifecycle};
pub use router::{classify, dispatch, Inbound, InboundHandler};
pub use session::{Session, SessionHandle};
pub use tracker::{
    OperationError, OperationPayload, OperationResult, OperationTracker, PendingReply, StoredText,
};
pub use transport::{Transport, TransportError, TransportEvent, TransportResult, WebSocketTransport};

/// Starts a session over a real WebSocket.
///
/// Must be called from within a tokio runtime.
pub fn connect(config: SessionConfig) -> SessionHandle {
    Session::spawn(config, WebSocketTransport::new())
}

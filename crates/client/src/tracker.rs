// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Save/retrieve request tracking.
//!
//! Every request gets a fresh `request_id`. At most one request of each
//! [`OperationKind`] is outstanding; a second one is rejected with
//! [`OperationError::InFlight`] rather than racing the first.

use std::collections::HashMap;

use pasty_core::{
    captcha, ClientMessage, OperationKind, RetrievePayload, SavePayload, MAX_CONTENT_LEN,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::lifecycle::ConnectionState;

/// Text returned by a successful save or retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredText {
    pub id: String,
    pub content: String,
}

/// Why an operation did not produce a [`StoredText`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("CAPTCHA verification failed")]
    CaptchaMismatch,

    #[error("text exceeds allowed length")]
    ContentTooLong,

    #[error("not connected")]
    NotConnected,

    #[error("a {0} request is already in flight")]
    InFlight(OperationKind),

    /// The server answered with an error message.
    #[error("{0}")]
    Rejected(String),

    /// The connection dropped before a response arrived.
    #[error("connection lost before the server responded")]
    ConnectionLost,

    #[error("session closed")]
    SessionClosed,
}

/// A save or retrieve request as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationPayload {
    Save(SavePayload),
    Retrieve(RetrievePayload),
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationPayload::Save(_) => OperationKind::Save,
            OperationPayload::Retrieve(_) => OperationKind::Retrieve,
        }
    }

    fn captcha(&self) -> (&str, &str) {
        match self {
            OperationPayload::Save(p) => (&p.captcha_input, &p.captcha_code),
            OperationPayload::Retrieve(p) => (&p.captcha_input, &p.captcha_code),
        }
    }

    /// Client-side checks that do not depend on the connection.
    pub fn validate(&self) -> Result<(), OperationError> {
        let (input, code) = self.captcha();
        if !captcha::matches(input, code) {
            return Err(OperationError::CaptchaMismatch);
        }
        if let OperationPayload::Save(p) = self {
            if p.content.chars().count() > MAX_CONTENT_LEN {
                return Err(OperationError::ContentTooLong);
            }
        }
        Ok(())
    }

    fn summary(&self) -> String {
        match self {
            OperationPayload::Save(p) => format!("{} chars", p.content.chars().count()),
            OperationPayload::Retrieve(p) => format!("id {}", p.lookup_id),
        }
    }

    fn into_message(self, request_id: u64) -> ClientMessage {
        match self {
            OperationPayload::Save(p) => ClientMessage::save(p, Some(request_id)),
            OperationPayload::Retrieve(p) => ClientMessage::retrieve(p, Some(request_id)),
        }
    }
}

impl From<SavePayload> for OperationPayload {
    fn from(payload: SavePayload) -> Self {
        OperationPayload::Save(payload)
    }
}

impl From<RetrievePayload> for OperationPayload {
    fn from(payload: RetrievePayload) -> Self {
        OperationPayload::Retrieve(payload)
    }
}

pub type OperationResult = Result<StoredText, OperationError>;

/// Future result of a submitted operation.
#[derive(Debug)]
pub struct PendingReply {
    kind: OperationKind,
    request_id: u64,
    rx: oneshot::Receiver<OperationResult>,
}

impl PendingReply {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Waits for the server's response.
    pub async fn wait(self) -> OperationResult {
        self.rx.await.unwrap_or(Err(OperationError::SessionClosed))
    }
}

#[derive(Debug)]
struct PendingOperation {
    request_id: u64,
    summary: String,
    reply: oneshot::Sender<OperationResult>,
}

/// Correlates outbound requests with their responses.
#[derive(Debug, Default)]
pub struct OperationTracker {
    next_request_id: u64,
    pending: HashMap<OperationKind, PendingOperation>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a request.
    ///
    /// Returns the message to send and the reply handle. Nothing is
    /// registered when an error is returned, so nothing should be sent.
    pub fn submit(
        &mut self,
        payload: OperationPayload,
        state: ConnectionState,
    ) -> Result<(ClientMessage, PendingReply), OperationError> {
        let kind = payload.kind();

        payload.validate()?;
        if !state.is_connected() {
            return Err(OperationError::NotConnected);
        }
        if let Some(existing) = self.pending.get(&kind) {
            // A caller that dropped its reply no longer holds the slot
            if !existing.reply.is_closed() {
                return Err(OperationError::InFlight(kind));
            }
            debug!("replacing abandoned {} request {}", kind, existing.request_id);
        }

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let (tx, rx) = oneshot::channel();
        debug!("submitting {} request {} ({})", kind, request_id, payload.summary());
        self.pending.insert(
            kind,
            PendingOperation {
                request_id,
                summary: payload.summary(),
                reply: tx,
            },
        );

        let reply = PendingReply {
            kind,
            request_id,
            rx,
        };
        Ok((payload.into_message(request_id), reply))
    }

    /// Resolves the pending request of `kind` with a server response.
    ///
    /// A response carrying a different `request_id` belongs to an abandoned
    /// request and is ignored. Returns true if a request was resolved.
    pub fn resolve(
        &mut self,
        kind: OperationKind,
        request_id: Option<u64>,
        result: OperationResult,
    ) -> bool {
        match self.pending.get(&kind) {
            None => {
                debug!("no pending {} request for response", kind);
                return false;
            }
            Some(pending) if request_id.is_some_and(|id| id != pending.request_id) => {
                warn!(
                    "ignoring {} response for request {:?}, expected {}",
                    kind, request_id, pending.request_id
                );
                return false;
            }
            Some(_) => {}
        }

        if let Some(pending) = self.pending.remove(&kind) {
            debug!(
                "{} request {} ({}) resolved, ok={}",
                kind,
                pending.request_id,
                pending.summary,
                result.is_ok()
            );
            // The caller may have stopped waiting
            let _ = pending.reply.send(result);
        }
        true
    }

    /// Fails every pending request with `err`.
    pub fn fail_all(&mut self, err: OperationError) {
        for (kind, pending) in self.pending.drain() {
            debug!("failing {} request {}: {}", kind, pending.request_id, err);
            let _ = pending.reply.send(Err(err.clone()));
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self, kind: OperationKind) -> bool {
        self.pending.contains_key(&kind)
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;

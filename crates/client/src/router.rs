// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound message dispatch.
//!
//! Frames that fail to parse, lack a `type`, or name an unknown `type` are
//! logged and dropped. They never reach a handler and never affect the
//! connection state.

use pasty_core::{OperationKind, ServerMessage};
use serde_json::Value;
use tracing::{debug, warn};

use crate::tracker::StoredText;

const KNOWN_TYPES: [&str; 6] = [
    "count_update",
    "pong",
    "save_success",
    "save_error",
    "retrieve_success",
    "retrieve_error",
];

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    CountUpdate(u64),
    Pong,
    Success {
        kind: OperationKind,
        request_id: Option<u64>,
        text: StoredText,
    },
    Failure {
        kind: OperationKind,
        request_id: Option<u64>,
        error: String,
    },
}

/// Receives dispatched messages.
pub trait InboundHandler {
    fn on_count_update(&mut self, count: u64);
    fn on_pong(&mut self);
    fn on_operation_success(&mut self, kind: OperationKind, request_id: Option<u64>, text: StoredText);
    fn on_operation_error(&mut self, kind: OperationKind, request_id: Option<u64>, error: String);
}

/// Classifies a raw text frame.
pub fn classify(raw: &str) -> Option<Inbound> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!("dropping non-JSON frame: {}", e);
            return None;
        }
    };

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        debug!("dropping frame without a type: {}", raw);
        return None;
    };
    if !KNOWN_TYPES.contains(&kind) {
        warn!("dropping message of unknown type '{}'", kind);
        return None;
    }
    let kind = kind.to_owned();

    let msg: ServerMessage = match serde_json::from_value(value) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("dropping malformed '{}' message: {}", kind, e);
            return None;
        }
    };

    let inbound = match msg {
        ServerMessage::CountUpdate { count } => Inbound::CountUpdate(count),
        ServerMessage::Pong { .. } => Inbound::Pong,
        ServerMessage::SaveSuccess {
            id,
            content,
            request_id,
        } => Inbound::Success {
            kind: OperationKind::Save,
            request_id,
            text: StoredText { id, content },
        },
        ServerMessage::RetrieveSuccess {
            id,
            content,
            request_id,
        } => Inbound::Success {
            kind: OperationKind::Retrieve,
            request_id,
            text: StoredText { id, content },
        },
        ServerMessage::SaveError { error, request_id } => Inbound::Failure {
            kind: OperationKind::Save,
            request_id,
            error,
        },
        ServerMessage::RetrieveError { error, request_id } => Inbound::Failure {
            kind: OperationKind::Retrieve,
            request_id,
            error,
        },
    };
    Some(inbound)
}

/// Classifies `raw` and hands it to exactly one handler method.
///
/// Returns false if the frame was dropped.
pub fn dispatch(raw: &str, handler: &mut impl InboundHandler) -> bool {
    let Some(inbound) = classify(raw) else {
        return false;
    };
    match inbound {
        Inbound::CountUpdate(count) => handler.on_count_update(count),
        Inbound::Pong => handler.on_pong(),
        Inbound::Success {
            kind,
            request_id,
            text,
        } => handler.on_operation_success(kind, request_id, text),
        Inbound::Failure {
            kind,
            request_id,
            error,
        } => handler.on_operation_error(kind, request_id, error),
    }
    true
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages for client-server communication.
//!
//! Every frame is a JSON object discriminated by its `type` field:
//! - Client sends heartbeat pings and save/retrieve requests
//! - Server broadcasts the stored item count and answers requests
//!
//! Requests may carry a `request_id` which the server echoes on the matching
//! response. Peers that omit it are still understood.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of a saved text, in characters.
pub const MAX_CONTENT_LEN: usize = 2000;

/// The two request/response operations carried over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Store a new text and receive its identifier.
    Save,
    /// Look up a stored text by identifier.
    Retrieve,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Save => "save",
            OperationKind::Retrieve => "retrieve",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a save request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePayload {
    /// The text to store.
    pub content: String,
    /// The CAPTCHA answer typed by the user.
    pub captcha_input: String,
    /// The CAPTCHA code that was shown.
    pub captcha_code: String,
}

impl SavePayload {
    pub fn new(
        content: impl Into<String>,
        captcha_input: impl Into<String>,
        captcha_code: impl Into<String>,
    ) -> Self {
        SavePayload {
            content: content.into(),
            captcha_input: captcha_input.into(),
            captcha_code: captcha_code.into(),
        }
    }
}

/// Payload of a retrieve request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievePayload {
    /// Identifier returned by an earlier save.
    pub lookup_id: String,
    /// The CAPTCHA answer typed by the user.
    pub captcha_input: String,
    /// The CAPTCHA code that was shown.
    pub captcha_code: String,
}

impl RetrievePayload {
    pub fn new(
        lookup_id: impl Into<String>,
        captcha_input: impl Into<String>,
        captcha_code: impl Into<String>,
    ) -> Self {
        RetrievePayload {
            lookup_id: lookup_id.into(),
            captcha_input: captcha_input.into(),
            captcha_code: captcha_code.into(),
        }
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Application-level heartbeat. The server answers with [`ServerMessage::Pong`].
    Ping,

    /// Store a text.
    SaveText {
        content: String,
        captcha_input: String,
        captcha_code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// Fetch a stored text.
    RetrieveText {
        lookup_id: String,
        captcha_input: String,
        captcha_code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The total number of stored items changed.
    ///
    /// Broadcast to every connected client, and sent once on connect.
    CountUpdate { count: u64 },

    /// Heartbeat reply.
    Pong {
        /// Server wall clock, RFC 3339.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_time: Option<String>,
        /// Number of currently connected clients.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        active_connections: Option<usize>,
    },

    /// A save request succeeded.
    SaveSuccess {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// A save request was rejected.
    SaveError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// A retrieve request succeeded.
    RetrieveSuccess {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// A retrieve request was rejected.
    RetrieveError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },
}

impl ClientMessage {
    /// Creates a Ping message.
    pub fn ping() -> Self {
        ClientMessage::Ping
    }

    /// Creates a SaveText message.
    pub fn save(payload: SavePayload, request_id: Option<u64>) -> Self {
        ClientMessage::SaveText {
            content: payload.content,
            captcha_input: payload.captcha_input,
            captcha_code: payload.captcha_code,
            request_id,
        }
    }

    /// Creates a RetrieveText message.
    pub fn retrieve(payload: RetrievePayload, request_id: Option<u64>) -> Self {
        ClientMessage::RetrieveText {
            lookup_id: payload.lookup_id,
            captcha_input: payload.captcha_input,
            captcha_code: payload.captcha_code,
            request_id,
        }
    }

    /// Returns the operation this message requests, if any.
    pub fn operation_kind(&self) -> Option<OperationKind> {
        match self {
            ClientMessage::Ping => None,
            ClientMessage::SaveText { .. } => Some(OperationKind::Save),
            ClientMessage::RetrieveText { .. } => Some(OperationKind::Retrieve),
        }
    }

    /// Returns the correlation ID carried by a request.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ClientMessage::Ping => None,
            ClientMessage::SaveText { request_id, .. }
            | ClientMessage::RetrieveText { request_id, .. } => *request_id,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates a CountUpdate message.
    pub fn count_update(count: u64) -> Self {
        ServerMessage::CountUpdate { count }
    }

    /// Creates a Pong message. Absent details are left out of the JSON.
    pub fn pong(server_time: Option<String>, active_connections: Option<usize>) -> Self {
        ServerMessage::Pong {
            server_time,
            active_connections,
        }
    }

    /// Creates the success response for an operation.
    pub fn success(
        kind: OperationKind,
        id: impl Into<String>,
        content: impl Into<String>,
        request_id: Option<u64>,
    ) -> Self {
        let (id, content) = (id.into(), content.into());
        match kind {
            OperationKind::Save => ServerMessage::SaveSuccess {
                id,
                content,
                request_id,
            },
            OperationKind::Retrieve => ServerMessage::RetrieveSuccess {
                id,
                content,
                request_id,
            },
        }
    }

    /// Creates the error response for an operation.
    pub fn failure(kind: OperationKind, error: impl Into<String>, request_id: Option<u64>) -> Self {
        let error = error.into();
        match kind {
            OperationKind::Save => ServerMessage::SaveError { error, request_id },
            OperationKind::Retrieve => ServerMessage::RetrieveError { error, request_id },
        }
    }

    /// Returns the operation this message answers, if any.
    pub fn operation_kind(&self) -> Option<OperationKind> {
        match self {
            ServerMessage::SaveSuccess { .. } | ServerMessage::SaveError { .. } => {
                Some(OperationKind::Save)
            }
            ServerMessage::RetrieveSuccess { .. } | ServerMessage::RetrieveError { .. } => {
                Some(OperationKind::Retrieve)
            }
            ServerMessage::CountUpdate { .. } | ServerMessage::Pong { .. } => None,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! pasty-core: Shared library for the pasty text drop.
//!
//! This crate provides the wire protocol, the CAPTCHA comparison rule and the
//! content limits used by both the pasty client library and the pasty server.

pub mod captcha;
pub mod error;
pub mod protocol;

pub use error::{Error, Result};
pub use protocol::{
    ClientMessage, OperationKind, RetrievePayload, SavePayload, ServerMessage, MAX_CONTENT_LEN,
};

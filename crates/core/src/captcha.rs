// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! CAPTCHA comparison rule shared by client and server.
//!
//! The code shown to the user and the answer typed back are compared after
//! trimming surrounding whitespace and upper-casing, so `" ab "` answers `AB`.
//! The client applies the rule before sending a request; the server applies
//! it again and stays authoritative.

/// Normalizes a CAPTCHA string for comparison.
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Returns true if the typed answer matches the issued code.
pub fn matches(input: &str, code: &str) -> bool {
    normalize(input) == normalize(code)
}

#[cfg(test)]
#[path = "captcha_tests.rs"]
mod tests;

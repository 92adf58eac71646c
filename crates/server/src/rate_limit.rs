// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-window request limiter keyed by client IP.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use parking_lot::Mutex;

/// Requests allowed per client per window.
pub const DEFAULT_LIMIT: u32 = 30;

/// Window length in seconds.
pub const WINDOW_SECS: u64 = 60;

/// Counts requests per `(client, window)` and refuses those over the limit.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window_secs: u64,
    buckets: Mutex<HashMap<(String, u64), u32>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        RateLimiter {
            limit,
            window_secs: window_secs.max(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request from `client` now. Returns false if it is over the limit.
    pub fn check(&self, client: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.check_at(client, now)
    }

    /// Records a request from `client` at `unix_secs`.
    pub fn check_at(&self, client: &str, unix_secs: u64) -> bool {
        let window = unix_secs / self.window_secs;
        let mut buckets = self.buckets.lock();

        // Only the current and previous windows are kept
        buckets.retain(|(_, w), _| *w + 1 >= window);

        let count = buckets.entry((client.to_string(), window)).or_insert(0);
        *count += 1;
        *count <= self.limit
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(DEFAULT_LIMIT, WINDOW_SECS)
    }
}

/// Identifies the client behind a request.
///
/// Proxy headers win over the socket address: `cf-connecting-ip`, then the
/// first `x-forwarded-for` entry, then `x-real-ip`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header("cf-connecting-ip")
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|xff| xff.split(',').next().map(|ip| ip.trim().to_string()))
                .filter(|ip| !ip.is_empty())
        })
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed text storage.
//!
//! Entries are keyed by a random four-letter identifier and expire a fixed
//! time after creation. Every method takes the current time explicitly.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

/// Length of a text identifier.
pub const ID_LEN: usize = 4;

/// Identifier draws before giving up on finding a free one.
const MAX_ID_ATTEMPTS: usize = 64;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS texts (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    ip_address TEXT,
    retrieval_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_texts_created ON texts(created_at);
"#;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no free identifier available")]
    IdSpaceExhausted,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Formats a timestamp so that string order matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn random_id(rng: &mut impl Rng) -> String {
    (0..ID_LEN)
        .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
        .collect()
}

/// Text storage on a single SQLite connection.
pub struct TextStore {
    pub(crate) conn: Connection,
}

impl TextStore {
    /// Opens the database at `path`, creating it and its schema if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(TextStore { conn })
    }

    /// Opens an in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(TextStore { conn })
    }

    /// Number of stored texts.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM texts", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Stores a text under a fresh identifier and returns the identifier.
    pub fn insert(
        &mut self,
        content: &str,
        ip_address: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let id = self.unused_id()?;
        let now = timestamp(now);
        self.conn.execute(
            "INSERT INTO texts (id, content, created_at, last_accessed, ip_address)
             VALUES (?1, ?2, ?3, ?3, ?4)",
            params![id, content, now, ip_address],
        )?;
        Ok(id)
    }

    /// Looks up a text, counting the retrieval.
    pub fn fetch(&mut self, id: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let content: Option<String> = self
            .conn
            .query_row(
                "SELECT content FROM texts WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        if content.is_some() {
            self.conn.execute(
                "UPDATE texts
                 SET retrieval_count = retrieval_count + 1, last_accessed = ?2
                 WHERE id = ?1",
                params![id, timestamp(now)],
            )?;
        }
        Ok(content)
    }

    /// Deletes texts created before `cutoff`. Returns how many were removed.
    pub fn purge_created_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM texts WHERE created_at < ?1",
            params![timestamp(cutoff)],
        )?;
        Ok(removed)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM texts WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn unused_id(&self) -> Result<String> {
        let mut rng = rand::rng();
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = random_id(&mut rng);
            if !self.exists(&id)? {
                return Ok(id);
            }
        }
        Err(StoreError::IdSpaceExhausted)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

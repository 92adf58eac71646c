// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection lifecycle state machine.
//!
//! [`Lifecycle`] performs no I/O. The session driver feeds it transport
//! events and the current time, and carries out the [`Command`]s it returns.
//! Every timer (next ping, pong deadline, reconnect) is a field of the one
//! `Lifecycle` value, so a transition that clears them leaves nothing behind
//! that could fire against a newer connection.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// An open is in flight.
    Connecting,
    /// The channel is open; requests may be sent.
    Connected,
    /// Waiting out the backoff delay before the next open.
    Reconnecting,
    /// No automatic reconnect will happen.
    Disconnected,
    /// The transport reported an error; a reconnect is scheduled.
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side effect requested by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open the transport.
    Open,
    /// Send a heartbeat ping.
    SendPing,
    /// Close the transport.
    Close,
}

#[derive(Debug, Default, Clone, Copy)]
struct Timers {
    next_ping: Option<Instant>,
    pong_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl Timers {
    fn clear(&mut self) {
        *self = Timers::default();
    }

    fn earliest(&self) -> Option<Instant> {
        [self.next_ping, self.pong_deadline, self.reconnect_at]
            .into_iter()
            .flatten()
            .min()
    }
}

/// Connection lifecycle manager.
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    timers: Timers,
    exhausted: bool,
    last_error: Option<String>,
}

impl Lifecycle {
    /// Creates a lifecycle in `Connecting` along with the initial open.
    pub fn new(config: &SessionConfig) -> (Self, Command) {
        let lifecycle = Lifecycle {
            state: ConnectionState::Connecting,
            attempts: 0,
            max_attempts: config.max_reconnect_attempts,
            base_delay: config.reconnect_base_delay(),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
            timers: Timers::default(),
            exhausted: false,
            last_error: None,
        };
        (lifecycle, Command::Open)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once automatic reconnection has given up.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The most recent open failure or transport error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The earliest armed timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.earliest()
    }

    /// The transport finished opening.
    pub fn on_opened(&mut self, now: Instant) -> Vec<Command> {
        if self.state != ConnectionState::Connecting {
            debug!("ignoring open completion in state {}", self.state);
            return Vec::new();
        }
        info!("connected after {} reconnect attempts", self.attempts);
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.exhausted = false;
        self.last_error = None;
        self.timers.clear();
        self.timers.pong_deadline = Some(now + self.heartbeat_timeout);
        vec![Command::SendPing]
    }

    /// The transport could not be opened.
    pub fn on_open_failed(&mut self, now: Instant, detail: impl Into<String>) -> Vec<Command> {
        if self.state != ConnectionState::Connecting {
            debug!("ignoring open failure in state {}", self.state);
            return Vec::new();
        }
        let detail = detail.into();
        warn!("failed to open connection: {}", detail);
        self.last_error = Some(detail);
        self.schedule_reconnect(now, ConnectionState::Reconnecting);
        Vec::new()
    }

    /// The transport closed.
    pub fn on_closed(&mut self, now: Instant, clean: bool) -> Vec<Command> {
        if !self.owns_transport() {
            debug!("ignoring close in state {}", self.state);
            return Vec::new();
        }
        self.timers.clear();
        if clean && self.state == ConnectionState::Connected {
            info!("connection closed cleanly");
            self.state = ConnectionState::Disconnected;
        } else {
            warn!("connection lost");
            self.schedule_reconnect(now, ConnectionState::Reconnecting);
        }
        Vec::new()
    }

    /// The transport reported an error. The channel is treated as gone.
    pub fn on_error(&mut self, now: Instant, detail: impl Into<String>) -> Vec<Command> {
        if !self.owns_transport() {
            debug!("ignoring transport error in state {}", self.state);
            return Vec::new();
        }
        let detail = detail.into();
        warn!("transport error: {}", detail);
        self.last_error = Some(detail);
        self.schedule_reconnect(now, ConnectionState::Error);
        vec![Command::Close]
    }

    /// A heartbeat reply arrived.
    pub fn on_pong(&mut self, now: Instant) {
        if self.state != ConnectionState::Connected || self.timers.pong_deadline.is_none() {
            debug!("ignoring unsolicited pong");
            return;
        }
        self.timers.pong_deadline = None;
        self.timers.next_ping = Some(now + self.heartbeat_interval);
    }

    /// Fires every timer that has expired by `now`.
    pub fn on_tick(&mut self, now: Instant) -> Vec<Command> {
        let expired = |at: Option<Instant>| at.is_some_and(|at| at <= now);
        let mut commands = Vec::new();

        match self.state {
            ConnectionState::Connected => {
                if expired(self.timers.pong_deadline) {
                    warn!(
                        "no pong within {:?}, closing connection",
                        self.heartbeat_timeout
                    );
                    commands.push(Command::Close);
                    self.schedule_reconnect(now, ConnectionState::Reconnecting);
                } else if expired(self.timers.next_ping) {
                    self.timers.next_ping = None;
                    self.timers.pong_deadline = Some(now + self.heartbeat_timeout);
                    commands.push(Command::SendPing);
                }
            }
            ConnectionState::Reconnecting | ConnectionState::Error => {
                if expired(self.timers.reconnect_at) {
                    self.timers.reconnect_at = None;
                    info!("reconnecting (attempt {}/{})", self.attempts, self.max_attempts);
                    self.state = ConnectionState::Connecting;
                    commands.push(Command::Open);
                }
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {}
        }
        commands
    }

    /// User-initiated reconnect. Starts over with a fresh attempt budget.
    pub fn reconnect(&mut self, _now: Instant) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.owns_transport() {
            commands.push(Command::Close);
        }
        info!("manual reconnect from state {}", self.state);
        self.timers.clear();
        self.attempts = 0;
        self.exhausted = false;
        self.state = ConnectionState::Connecting;
        commands.push(Command::Open);
        commands
    }

    /// The client became visible again. Reconnects only when not connected
    /// and no open is already in flight.
    pub fn visibility_restored(&mut self, now: Instant) -> Vec<Command> {
        match self.state {
            ConnectionState::Reconnecting
            | ConnectionState::Disconnected
            | ConnectionState::Error => self.reconnect(now),
            ConnectionState::Connected | ConnectionState::Connecting => Vec::new(),
        }
    }

    /// Ends the session. No timer remains armed afterwards.
    pub fn shutdown(&mut self) -> Vec<Command> {
        self.timers.clear();
        self.state = ConnectionState::Disconnected;
        vec![Command::Close]
    }

    fn owns_transport(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        )
    }

    fn schedule_reconnect(&mut self, now: Instant, waiting: ConnectionState) {
        self.timers.clear();
        if self.attempts < self.max_attempts {
            self.attempts += 1;
            let delay = self.base_delay * self.attempts;
            info!(
                "reconnect attempt {}/{} in {:?}",
                self.attempts, self.max_attempts, delay
            );
            self.timers.reconnect_at = Some(now + delay);
            self.state = waiting;
        } else {
            warn!(
                "giving up after {} reconnect attempts",
                self.max_attempts
            );
            self.exhausted = true;
            self.state = ConnectionState::Disconnected;
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

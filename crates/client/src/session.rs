// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session driver.
//!
//! A [`Session`] owns one transport, its [`Lifecycle`] and its
//! [`OperationTracker`], and runs them on a single task:
//!
//! ```text
//! ┌───────────────┐  requests  ┌─────────────────────────┐  frames  ┌───────────┐
//! │ SessionHandle │───────────►│ Session task            │◄────────►│ Transport │
//! │               │◄───────────│  Lifecycle   (timers)   │          └───────────┘
//! └───────────────┘   watch    │  Router -> Tracker      │
//!                              └─────────────────────────┘
//! ```
//!
//! The task selects over handle requests, transport events, the earliest
//! lifecycle timer and cancellation. Each event runs to completion before the
//! next is looked at, so session state needs no locking.

use std::collections::VecDeque;

use pasty_core::{ClientMessage, OperationKind, RetrievePayload, SavePayload};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::lifecycle::{Command, ConnectionState, Lifecycle};
use crate::router::{self, InboundHandler};
use crate::tracker::{
    OperationError, OperationPayload, OperationTracker, PendingReply, StoredText,
};
use crate::transport::{Transport, TransportEvent, TransportResult};

/// Requests from a [`SessionHandle`] to its task.
enum Request {
    Submit {
        payload: OperationPayload,
        reply: oneshot::Sender<Result<PendingReply, OperationError>>,
    },
    Reconnect,
    VisibilityRestored,
}

/// One client's connection, spanning any number of physical reconnects.
pub struct Session<T: Transport> {
    config: SessionConfig,
    transport: T,
    lifecycle: Lifecycle,
    tracker: OperationTracker,
    requests: mpsc::Receiver<Request>,
    state_tx: watch::Sender<ConnectionState>,
    count_tx: watch::Sender<Option<u64>>,
    cancel: CancellationToken,
    queue: VecDeque<Command>,
}

impl<T: Transport + 'static> Session<T> {
    /// Starts a session on its own task and begins connecting.
    pub fn spawn(config: SessionConfig, transport: T) -> SessionHandle {
        let (request_tx, request_rx) = mpsc::channel(32);
        let (lifecycle, open) = Lifecycle::new(&config);
        let (state_tx, state_rx) = watch::channel(lifecycle.state());
        let (count_tx, count_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let session = Session {
            config,
            transport,
            lifecycle,
            tracker: OperationTracker::new(),
            requests: request_rx,
            state_tx,
            count_tx,
            cancel: cancel.clone(),
            queue: VecDeque::from([open]),
        };
        let task = tokio::spawn(session.run());

        SessionHandle {
            requests: request_tx,
            state: state_rx,
            count: count_rx,
            cancel,
            task: Some(task),
        }
    }
}

impl<T: Transport> Session<T> {
    async fn run(mut self) {
        info!("session starting, url={}", self.config.url);
        loop {
            self.execute_queued().await;
            if self.cancel.is_cancelled() {
                break;
            }

            let receiving = self.lifecycle.state().is_connected() && self.transport.is_connected();
            let deadline = self.lifecycle.next_deadline();

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(request) = self.requests.recv() => {
                    self.handle_request(request).await;
                }
                event = self.transport.recv(), if receiving => {
                    self.handle_transport(event);
                }
                _ = sleep_until(deadline) => {
                    let commands = self.lifecycle.on_tick(Instant::now());
                    self.queue.extend(commands);
                }
            }
            self.publish_state();
        }

        let commands = self.lifecycle.shutdown();
        self.queue.clear();
        for command in commands {
            if command == Command::Close {
                let _ = self.transport.disconnect().await;
            }
        }
        self.publish_state();
        self.tracker.fail_all(OperationError::SessionClosed);
        info!("session stopped");
    }

    /// Carries out lifecycle commands, including any they cause in turn.
    async fn execute_queued(&mut self) {
        while let Some(command) = self.queue.pop_front() {
            if self.cancel.is_cancelled() {
                return;
            }
            match command {
                Command::Open => self.open().await,
                Command::SendPing => {
                    debug!("sending heartbeat ping");
                    if let Err(e) = self.transport.send(ClientMessage::ping()).await {
                        let commands = self.lifecycle.on_error(Instant::now(), e.to_string());
                        self.queue.extend(commands);
                    }
                }
                Command::Close => {
                    // The socket is being abandoned either way
                    let _ = self.transport.disconnect().await;
                }
            }
            self.publish_state();
        }
    }

    /// Opens the transport while still answering handle requests.
    ///
    /// Submits fail fast with `NotConnected`. A reconnect abandons the
    /// in-flight open and queues a fresh one.
    async fn open(&mut self) {
        let url = self.config.url.clone();
        let timeout = self.config.connect_timeout();
        debug!("opening {}", url);

        let result = {
            let connect = tokio::time::timeout(timeout, self.transport.connect(&url));
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    result = &mut connect => break result,
                    Some(request) = self.requests.recv() => {
                        let now = Instant::now();
                        let commands = match request {
                            Request::Submit { payload, reply } => {
                                let err = payload
                                    .validate()
                                    .err()
                                    .unwrap_or(OperationError::NotConnected);
                                let _ = reply.send(Err(err));
                                continue;
                            }
                            Request::Reconnect => self.lifecycle.reconnect(now),
                            Request::VisibilityRestored => {
                                self.lifecycle.visibility_restored(now)
                            }
                        };
                        if !commands.is_empty() {
                            debug!("abandoning open of {}", url);
                            self.queue.extend(commands);
                            return;
                        }
                    }
                }
            }
        };

        let now = Instant::now();
        let commands = match result {
            Ok(Ok(())) => self.lifecycle.on_opened(now),
            Ok(Err(e)) => self.lifecycle.on_open_failed(now, e.to_string()),
            Err(_) => self
                .lifecycle
                .on_open_failed(now, format!("timed out after {:?}", timeout)),
        };
        self.queue.extend(commands);
    }

    async fn handle_request(&mut self, request: Request) {
        let now = Instant::now();
        match request {
            Request::Submit { payload, reply } => {
                let result = self.submit(payload).await;
                // The caller may have given up waiting
                let _ = reply.send(result);
            }
            Request::Reconnect => {
                let commands = self.lifecycle.reconnect(now);
                self.queue.extend(commands);
            }
            Request::VisibilityRestored => {
                let commands = self.lifecycle.visibility_restored(now);
                self.queue.extend(commands);
            }
        }
    }

    async fn submit(&mut self, payload: OperationPayload) -> Result<PendingReply, OperationError> {
        let (msg, pending) = self.tracker.submit(payload, self.lifecycle.state())?;
        if let Err(e) = self.transport.send(msg).await {
            // Leaving Connected fails the pending reply with ConnectionLost
            let commands = self.lifecycle.on_error(Instant::now(), e.to_string());
            self.queue.extend(commands);
        }
        Ok(pending)
    }

    fn handle_transport(&mut self, event: TransportResult<TransportEvent>) {
        let now = Instant::now();
        let commands = match event {
            Ok(TransportEvent::Message(raw)) => {
                router::dispatch(&raw, self);
                Vec::new()
            }
            Ok(TransportEvent::Closed { clean, reason }) => {
                info!("connection closed (clean={}): {}", clean, reason);
                self.lifecycle.on_closed(now, clean)
            }
            Err(e) => self.lifecycle.on_error(now, e.to_string()),
        };
        self.queue.extend(commands);
    }

    /// Publishes the lifecycle state to watchers.
    ///
    /// Leaving `Connected` fails every pending request, since a response can
    /// only arrive on the connection that carried the request.
    fn publish_state(&mut self) {
        let state = self.lifecycle.state();
        let previous = *self.state_tx.borrow();
        if previous == state {
            return;
        }
        if previous == ConnectionState::Connected {
            self.tracker.fail_all(OperationError::ConnectionLost);
        }
        info!("connection state {} -> {}", previous, state);
        self.state_tx.send_replace(state);
    }
}

impl<T: Transport> InboundHandler for Session<T> {
    fn on_count_update(&mut self, count: u64) {
        // Repeated values do not wake watchers
        self.count_tx.send_if_modified(|current| {
            if *current == Some(count) {
                false
            } else {
                *current = Some(count);
                true
            }
        });
    }

    fn on_pong(&mut self) {
        self.lifecycle.on_pong(Instant::now());
    }

    fn on_operation_success(
        &mut self,
        kind: OperationKind,
        request_id: Option<u64>,
        text: StoredText,
    ) {
        self.tracker.resolve(kind, request_id, Ok(text));
    }

    fn on_operation_error(&mut self, kind: OperationKind, request_id: Option<u64>, error: String) {
        self.tracker
            .resolve(kind, request_id, Err(OperationError::Rejected(error)));
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Owned handle to a running session.
///
/// Dropping the handle stops the session.
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<ConnectionState>,
    count: watch::Receiver<Option<u64>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Submits a request and returns a handle to its eventual response.
    ///
    /// Client-side rejections (CAPTCHA mismatch, over-long text, not
    /// connected, same kind already in flight) are returned immediately and
    /// nothing is sent.
    pub async fn submit(
        &self,
        payload: impl Into<OperationPayload>,
    ) -> Result<PendingReply, OperationError> {
        let (reply, rx) = oneshot::channel();
        let request = Request::Submit {
            payload: payload.into(),
            reply,
        };
        self.requests
            .send(request)
            .await
            .map_err(|_| OperationError::SessionClosed)?;
        rx.await.map_err(|_| OperationError::SessionClosed)?
    }

    /// Saves a text and waits for its identifier.
    pub async fn save(&self, payload: SavePayload) -> Result<StoredText, OperationError> {
        self.submit(payload).await?.wait().await
    }

    /// Retrieves a stored text.
    pub async fn retrieve(&self, payload: RetrievePayload) -> Result<StoredText, OperationError> {
        self.submit(payload).await?.wait().await
    }

    /// Drops the current connection, if any, and connects again with a fresh
    /// attempt budget.
    pub async fn reconnect(&self) {
        if self.requests.send(Request::Reconnect).await.is_err() {
            warn!("reconnect requested on a stopped session");
        }
    }

    /// Reconnects if the session is down. Does nothing while connected or
    /// connecting.
    pub async fn visibility_restored(&self) {
        if self.requests.send(Request::VisibilityRestored).await.is_err() {
            warn!("visibility change on a stopped session");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Last count pushed by the server, if one has arrived.
    pub fn count(&self) -> Option<u64> {
        *self.count.borrow()
    }

    pub fn watch_count(&self) -> watch::Receiver<Option<u64>> {
        self.count.clone()
    }

    /// Stops the session and waits for its task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("session task failed: {}", e);
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and WebSocket server implementation.
//!
//! Handles client connections, message routing, and broadcast fanout. One
//! listener serves the WebSocket upgrade and the plain HTTP routes:
//!
//! - `GET /ws`, `GET /ws/row-count`: WebSocket channel
//! - `GET /api/count`: current count as JSON, for clients without a channel
//! - `GET /ping`: rate-limited liveness probe

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use pasty_core::{ClientMessage, OperationKind, ServerMessage};

use crate::rate_limit::client_ip;
use crate::state::{RequestError, ServerState};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body of `GET /api/count`.
#[derive(Debug, Serialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: &'static str,
}

/// Builds the router for all routes.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/ws/row-count", get(ws_handler))
        .route("/api/count", get(count_handler))
        .route("/ping", get(ping_handler))
        .with_state(state)
}

/// Run the server on the given address.
pub async fn run(addr: SocketAddr, state: ServerState) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", listener.local_addr()?);
    serve(listener, state).await?;
    Ok(())
}

/// Serves connections from an already bound listener until it fails.
pub async fn serve(listener: TcpListener, state: ServerState) -> std::io::Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<ServerState>,
) -> Response {
    let client = client_ip(&headers, Some(peer_addr));
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_connection(socket, &client, state).await {
            error!("Connection error from {}: {}", client, e);
        }
    })
}

async fn count_handler(State(state): State<ServerState>) -> Response {
    match state.count().await {
        Ok(count) => Json(CountResponse { count }).into_response(),
        Err(e) => {
            error!("Failed to read count: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn ping_handler(
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<ServerState>,
) -> Response {
    let client = client_ip(&headers, Some(peer_addr));
    if !state.allow_ping(&client) {
        warn!("Rate limit exceeded for {}", client);
        let body = ErrorResponse {
            detail: "Rate limit exceeded",
        };
        return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    }
    Json(StatusResponse { status: "ok" }).into_response()
}

async fn send_message(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), BoxError> {
    let json = msg.to_json()?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Handle a single upgraded WebSocket connection.
pub(crate) async fn handle_connection(
    socket: WebSocket,
    client: &str,
    state: ServerState,
) -> Result<(), BoxError> {
    let _guard = state.connect();
    info!(
        "New WebSocket connection from: {} ({} active)",
        client,
        state.active_connections()
    );

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Subscribe before reading the count so no change falls in between
    let mut broadcast_rx = state.subscribe();
    let count = state.count().await?;
    send_message(&mut ws_sink, &ServerMessage::count_update(count)).await?;

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(response) = handle_client_message(text.as_str(), client, &state).await {
                            send_message(&mut ws_sink, &response).await?;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| f.code);
                        info!("Client {} disconnected ({:?})", client, code);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary frames are not part of the protocol; pings are answered by axum
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", client, e);
                        break;
                    }
                    None => {
                        info!("Client {} stream ended", client);
                        break;
                    }
                }
            }

            broadcast = broadcast_rx.recv() => {
                match broadcast {
                    Ok(msg) => {
                        if let Err(e) = send_message(&mut ws_sink, &msg).await {
                            warn!("Failed to send broadcast to {}: {}", client, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Client {} lagged by {} messages", client, n);
                    }
                    Err(RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }

    info!("Connection closed: {}", client);
    Ok(())
}

/// Process a client message and return an optional response.
///
/// Malformed frames are logged and produce no response.
pub(crate) async fn handle_client_message(
    text: &str,
    client: &str,
    state: &ServerState,
) -> Option<ServerMessage> {
    let msg = match ClientMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Ignoring malformed message from {}: {}", client, e);
            return None;
        }
    };
    debug!("Received message: {:?}", msg.operation_kind());

    let response = match msg {
        ClientMessage::Ping => ServerMessage::pong(
            Some(Utc::now().to_rfc3339()),
            Some(state.active_connections()),
        ),

        ClientMessage::SaveText {
            content,
            captcha_input,
            captcha_code,
            request_id,
        } => match state
            .save(&content, &captcha_input, &captcha_code, Some(client))
            .await
        {
            Ok(id) => ServerMessage::success(OperationKind::Save, id, content, request_id),
            Err(e) => rejection(OperationKind::Save, &e, request_id),
        },

        ClientMessage::RetrieveText {
            lookup_id,
            captcha_input,
            captcha_code,
            request_id,
        } => match state
            .retrieve(&lookup_id, &captcha_input, &captcha_code)
            .await
        {
            Ok(content) => {
                ServerMessage::success(OperationKind::Retrieve, lookup_id, content, request_id)
            }
            Err(e) => rejection(OperationKind::Retrieve, &e, request_id),
        },
    };
    Some(response)
}

fn rejection(kind: OperationKind, err: &RequestError, request_id: Option<u64>) -> ServerMessage {
    match err {
        RequestError::Storage(e) => error!("{} failed: {}", kind, e),
        _ => debug!("{} rejected: {}", kind, err),
    }
    ServerMessage::failure(kind, err.to_string(), request_id)
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

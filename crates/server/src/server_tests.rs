// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server tests over real sockets and through the router directly.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::Request;
use chrono::TimeDelta;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use pasty_core::{ClientMessage, OperationKind, RetrievePayload, SavePayload, ServerMessage};

use super::*;
use crate::store::TextStore;

const TIMEOUT: Duration = Duration::from_secs(5);

fn test_state() -> ServerState {
    ServerState::new(TextStore::open_in_memory().unwrap(), TimeDelta::hours(24))
}

/// A server on a random port, stopped on shutdown.
struct TestServer {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    state: ServerState,
}

impl TestServer {
    async fn start() -> Self {
        let state = test_state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let serve_state = state.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = serve(listener, serve_state) => {
                    if let Err(e) = result {
                        eprintln!("Test server error: {}", e);
                    }
                }
                _ = shutdown_rx => {}
            }
        });

        TestServer {
            addr,
            shutdown_tx,
            state,
        }
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Connects a client and consumes the count sent on connect.
    async fn client(&self) -> (TestClient, u64) {
        let (ws, _) = connect_async(self.ws_url("/ws/row-count")).await.unwrap();
        let mut client = TestClient { ws };
        match client.recv().await {
            ServerMessage::CountUpdate { count } => (client, count),
            other => panic!("expected initial count, got {:?}", other),
        }
    }

    fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn send(&mut self, msg: &ClientMessage) {
        self.send_raw(&msg.to_json().unwrap()).await;
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    async fn recv(&mut self) -> ServerMessage {
        loop {
            match timeout(TIMEOUT, self.ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    return ServerMessage::from_json(text.as_str()).unwrap();
                }
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                Ok(other) => panic!("unexpected frame: {:?}", other),
                Err(_) => panic!("timeout waiting for server message"),
            }
        }
    }

    /// Receives `n` messages, in arrival order.
    async fn recv_n(&mut self, n: usize) -> Vec<ServerMessage> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.recv().await);
        }
        out
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

fn save(content: &str, request_id: u64) -> ClientMessage {
    ClientMessage::save(SavePayload::new(content, "ab", "AB"), Some(request_id))
}

#[tokio::test]
async fn new_connection_receives_current_count() {
    let server = TestServer::start().await;
    server.state.save("one", "AB", "AB", None).await.unwrap();
    server.state.save("two", "AB", "AB", None).await.unwrap();

    let (_client, count) = server.client().await;
    assert_eq!(count, 2);
    server.shutdown();
}

#[tokio::test]
async fn both_paths_serve_the_channel() {
    let server = TestServer::start().await;
    for path in ["/ws", "/ws/row-count"] {
        let (ws, _) = connect_async(server.ws_url(path)).await.unwrap();
        let mut client = TestClient { ws };
        assert_eq!(client.recv().await, ServerMessage::count_update(0));
    }
    server.shutdown();
}

#[tokio::test]
async fn ping_reports_time_and_connections() {
    let server = TestServer::start().await;
    let (mut first, _) = server.client().await;
    let (_second, _) = server.client().await;

    first.send(&ClientMessage::ping()).await;
    match first.recv().await {
        ServerMessage::Pong {
            server_time,
            active_connections,
        } => {
            let time = server_time.expect("server_time");
            assert!(chrono::DateTime::parse_from_rfc3339(&time).is_ok());
            assert_eq!(active_connections, Some(2));
        }
        other => panic!("expected pong, got {:?}", other),
    }
    server.shutdown();
}

#[tokio::test]
async fn save_answers_sender_and_broadcasts_count() {
    let server = TestServer::start().await;
    let (mut saver, _) = server.client().await;
    let (mut watcher, _) = server.client().await;

    saver.send(&save("hello", 7)).await;
    let messages = saver.recv_n(2).await;

    let id = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::SaveSuccess {
                id,
                content,
                request_id,
            } => {
                assert_eq!(content, "hello");
                assert_eq!(*request_id, Some(7));
                Some(id.clone())
            }
            _ => None,
        })
        .expect("save_success");
    assert_eq!(id.len(), 4);
    assert!(messages.contains(&ServerMessage::count_update(1)));

    assert_eq!(watcher.recv().await, ServerMessage::count_update(1));
    server.shutdown();
}

#[tokio::test]
async fn retrieve_round_trip_echoes_request_id() {
    let server = TestServer::start().await;
    let id = server
        .state
        .save("stored text", "AB", "AB", None)
        .await
        .unwrap();
    let (mut client, _) = server.client().await;

    let payload = RetrievePayload::new(id.clone(), " xy", "XY");
    client.send(&ClientMessage::retrieve(payload, Some(3))).await;
    assert_eq!(
        client.recv().await,
        ServerMessage::success(OperationKind::Retrieve, id, "stored text", Some(3))
    );

    let payload = RetrievePayload::new("QQQQ", "xy", "XY");
    client.send(&ClientMessage::retrieve(payload, Some(4))).await;
    assert_eq!(
        client.recv().await,
        ServerMessage::failure(OperationKind::Retrieve, "ID not found", Some(4))
    );
    server.shutdown();
}

#[tokio::test]
async fn invalid_requests_are_rejected_without_storing() {
    let server = TestServer::start().await;
    let (mut client, _) = server.client().await;

    let long = "x".repeat(pasty_core::MAX_CONTENT_LEN + 1);
    client.send(&save(&long, 1)).await;
    assert_eq!(
        client.recv().await,
        ServerMessage::failure(OperationKind::Save, "Text exceeds allowed length.", Some(1))
    );

    let bad_captcha = ClientMessage::save(SavePayload::new("hi", "AB", "CD"), Some(2));
    client.send(&bad_captcha).await;
    assert_eq!(
        client.recv().await,
        ServerMessage::failure(
            OperationKind::Save,
            "CAPTCHA verification failed. Please try again.",
            Some(2)
        )
    );

    let retrieve = ClientMessage::retrieve(RetrievePayload::new("ABCD", "AB", "CD"), None);
    client.send(&retrieve).await;
    assert_eq!(
        client.recv().await,
        ServerMessage::failure(
            OperationKind::Retrieve,
            "CAPTCHA verification failed. Please try again.",
            None
        )
    );

    assert_eq!(server.state.count().await.unwrap(), 0);
    server.shutdown();
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let server = TestServer::start().await;
    let (mut client, _) = server.client().await;

    client.send_raw("not json").await;
    client.send_raw(r#"{"type":"shout"}"#).await;
    client.send(&ClientMessage::ping()).await;

    assert!(matches!(client.recv().await, ServerMessage::Pong { .. }));
    server.shutdown();
}

#[tokio::test]
async fn closed_connection_does_not_stop_fanout() {
    let server = TestServer::start().await;
    let (gone, _) = server.client().await;
    let (mut staying, _) = server.client().await;
    gone.close().await;

    server.state.save("after close", "AB", "AB", None).await.unwrap();
    assert_eq!(staying.recv().await, ServerMessage::count_update(1));

    // The closed connection is eventually released
    timeout(TIMEOUT, async {
        while server.state.active_connections() != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection not released");
    server.shutdown();
}

async fn http_get(
    app: Router,
    uri: &str,
    forwarded_for: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(ip) = forwarded_for {
        request = request.header("x-forwarded-for", ip);
    }
    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 10_000)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn test_app(state: ServerState) -> Router {
    router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
}

#[tokio::test]
async fn count_endpoint_matches_store() {
    let state = test_state();
    let app = test_app(state.clone());

    let (status, body) = http_get(app.clone(), "/api/count", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "count": 0 }));

    state.save("one", "AB", "AB", None).await.unwrap();
    let (_, body) = http_get(app, "/api/count", None).await;
    assert_eq!(body, serde_json::json!({ "count": 1 }));
}

#[tokio::test]
async fn ping_endpoint_is_rate_limited_per_client() {
    let app = test_app(test_state());

    for _ in 0..crate::rate_limit::DEFAULT_LIMIT {
        let (status, body) = http_get(app.clone(), "/ping", Some("203.0.113.9")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "ok" }));
    }

    let (status, body) = http_get(app.clone(), "/ping", Some("203.0.113.9")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, serde_json::json!({ "detail": "Rate limit exceeded" }));

    // Another client behind the same peer address is unaffected
    let (status, _) = http_get(app, "/ping", Some("203.0.113.10")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn handle_client_message_ignores_garbage() {
    let state = test_state();
    assert_eq!(handle_client_message("{", "test", &state).await, None);
    assert_eq!(
        handle_client_message(r#"{"type":"save_text"}"#, "test", &state).await,
        None
    );
}

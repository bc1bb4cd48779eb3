//! WebSocket transport tests against an in-process JSON-RPC server.
//!
//! The server answers `signin`, `use`, `query` and `kill`, rejects every
//! other method (GraphQL included) as unknown, pushes one
//! notification right after every LIVE statement and closes with code 4000
//! when asked to run `CLOSE`.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use studio_link::{
    ConnectionConfig, ConnectionState, LiveAction, OpenOptions, Protocol, StudioLinkClient,
    StudioLinkError, Transport, TransportEvent, WsTransport,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

mod common;

const LIVE_ID: &str = "8f1e6a52-3f0c-4d47-9b1b-0f4a5c2d9e11";

// ── in-process server ────────────────────────────────────────────────────────

async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream));
        }
    });

    address.to_string()
}

fn reply(id: &JsonValue, result: JsonValue) -> Message {
    Message::text(json!({ "id": id, "result": result }).to_string())
}

async fn serve(stream: tokio::net::TcpStream) {
    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };

    while let Some(Ok(message)) = ws.next().await {
        let text = match message {
            Message::Text(text) => text.as_str().to_string(),
            Message::Close(_) => break,
            _ => continue,
        };
        let request: JsonValue = serde_json::from_str(&text).unwrap();
        let id = request["id"].clone();
        let params = request["params"].as_array().cloned().unwrap_or_default();

        match request["method"].as_str().unwrap_or_default() {
            "signin" => {
                let _ = ws.send(reply(&id, json!("token-123"))).await;
            },
            "use" | "kill" => {
                let _ = ws.send(reply(&id, JsonValue::Null)).await;
            },
            "query" => {
                let statement = params[0].as_str().unwrap_or_default().to_string();
                if statement == "CLOSE" {
                    let frame = CloseFrame {
                        code: CloseCode::from(4000),
                        reason: "bye".into(),
                    };
                    let _ = ws.send(Message::Close(Some(frame))).await;
                    continue;
                }
                if statement.starts_with("LIVE") {
                    let result = json!([{ "status": "OK", "time": "1ms", "result": LIVE_ID }]);
                    let _ = ws.send(reply(&id, result)).await;
                    let notification = json!({
                        "result": {
                            "id": LIVE_ID,
                            "action": "CREATE",
                            "result": { "name": "tobie" },
                        }
                    });
                    let _ = ws.send(Message::text(notification.to_string())).await;
                } else {
                    let result = json!([{ "status": "OK", "time": "1ms", "result": [{ "value": 1 }] }]);
                    let _ = ws.send(reply(&id, result)).await;
                }
            },
            _ => {
                let error = json!({
                    "id": id,
                    "error": { "code": -32601, "message": "Method not found" },
                });
                let _ = ws.send(Message::text(error.to_string())).await;
            },
        }
    }
}

fn endpoint(address: &str) -> String {
    format!("ws://{}/rpc", address)
}

// ── transport ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_requests_and_live_routing() {
    let address = spawn_server().await;
    let transport = WsTransport::new(common::test_timeouts());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    transport.connect(&endpoint(&address), events_tx).await.unwrap();

    transport
        .use_scope(&OpenOptions::new("test", "test"))
        .await
        .unwrap();

    let results = transport.query("SELECT 1", None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
    assert_eq!(results[0].result, json!([{ "value": 1 }]));

    // The notification is pushed before anyone subscribes, so it must be
    // held until the subscription arrives.
    let results = transport.query("LIVE SELECT * FROM person", None).await.unwrap();
    assert_eq!(results[0].result, json!(LIVE_ID));
    let mut live = transport.subscribe_live(LIVE_ID).await.unwrap();
    let notification = tokio::time::timeout(Duration::from_secs(5), live.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notification.action, LiveAction::Create);
    assert_eq!(notification.data, json!({ "name": "tobie" }));

    transport.kill(LIVE_ID).await.unwrap();
    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let address = spawn_server().await;
    let transport = WsTransport::new(common::test_timeouts());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    transport.connect(&endpoint(&address), events_tx).await.unwrap();

    let err = transport.invalidate().await.unwrap_err();
    assert!(matches!(err, StudioLinkError::ServerError(ref m) if m == "Method not found"));

    transport.close().await.unwrap();
}

#[tokio::test]
async fn test_server_close_emits_disconnect() {
    let address = spawn_server().await;
    let transport = WsTransport::new(common::test_timeouts());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    transport.connect(&endpoint(&address), events_tx).await.unwrap();

    let err = transport.query("CLOSE", None).await.unwrap_err();
    assert!(matches!(err, StudioLinkError::WebSocketError(_)));

    let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        TransportEvent::Disconnected(reason) => {
            assert_eq!(reason.code, Some(4000));
            assert_eq!(reason.message, "bye");
        },
        other => panic!("expected a disconnect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_close_is_silent() {
    let address = spawn_server().await;
    let transport = WsTransport::new(common::test_timeouts());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    transport.connect(&endpoint(&address), events_tx).await.unwrap();

    transport.close().await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
        .await
        .unwrap();
    assert!(next.is_none(), "no event after a client close");

    let err = transport.query("SELECT 1", None).await.unwrap_err();
    assert!(matches!(err, StudioLinkError::WebSocketError(_)));
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let transport = WsTransport::new(common::test_timeouts());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let err = transport
        .connect(&endpoint(&address), events_tx)
        .await
        .unwrap_err();
    assert!(matches!(err, StudioLinkError::WebSocketError(_)));
}

// ── full client ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_client_session_over_websocket() {
    let address = spawn_server().await;
    let client = StudioLinkClient::builder()
        .timeouts(common::test_timeouts())
        .version_source(std::sync::Arc::new(common::StaticVersionSource::new("surrealdb-2.0.4")))
        .minimum_version("1.3.0")
        .build()
        .unwrap();
    let config = ConnectionConfig::new(Protocol::Ws, address.as_str())
        .with_namespace("test")
        .with_database("test")
        .with_root_auth("root", "root");

    client.connect(&config).await.unwrap();
    assert_eq!(client.version().as_deref(), Some("2.0.4"));
    assert_eq!(client.access_token().as_deref(), Some("token-123"));

    let responses = client
        .execute_user_query("tab", "LIVE SELECT * FROM person; SELECT 1;", None)
        .await
        .unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(client.live_subscriptions("tab"), vec![LIVE_ID.to_string()]);

    assert!(common::eventually(|| client.live_messages("tab").len() == 1).await);
    let message = &client.live_messages("tab")[0];
    assert_eq!(message.subscription_id, LIVE_ID);
    assert_eq!(message.data, json!({ "name": "tobie" }));

    assert!(!client.check_graphql_support().await.unwrap());
    let response = client
        .execute_graphql("{ person { name } }", None, None)
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.error_message(), Some("Method not found"));

    let mut state = client.subscribe_state();
    client.execute_query("CLOSE", None).await.unwrap();
    state
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();
    assert!(client.version().is_none());
    assert!(!client.is_live("tab"));
}

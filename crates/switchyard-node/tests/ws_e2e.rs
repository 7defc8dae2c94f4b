//! End-to-end tests over real sockets: axum server, tungstenite clients.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use switchyard_node::{build_app, chat::chat_router, serve, NodeConfig};
use switchyard_router::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start() -> (SocketAddr, Arc<Router>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = NodeConfig {
        listen_addr: addr,
        ..NodeConfig::default()
    };
    let router = Arc::new(chat_router().unwrap());
    let app = build_app(&config, Arc::clone(&router)).unwrap();
    tokio::spawn(serve(listener, app, std::future::pending()));
    (addr, router)
}

async fn connect(addr: SocketAddr, target: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}{target}")).await.unwrap();
    ws
}

async fn next_message(ws: &mut Ws) -> Message {
    timeout(WAIT, ws.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("websocket error")
}

async fn next_of_type(ws: &mut Ws, kind: &str) -> Value {
    loop {
        if let Message::Text(text) = next_message(ws).await {
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["type"] == kind {
                return value;
            }
        }
    }
}

async fn send_json(ws: &mut Ws, payload: Value) {
    ws.send(Message::text(payload.to_string())).await.unwrap();
}

async fn http_get(addr: SocketAddr, path: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .expect("timed out")
        .unwrap();
    let (head, body) = response.split_once("\r\n\r\n").unwrap_or((&response, ""));
    let status = head.lines().next().unwrap_or_default().to_string();
    (status, body.to_string())
}

#[tokio::test]
async fn test_missing_token_closes_with_4003() {
    let (addr, _router) = start().await;
    let mut ws = connect(addr, "/chat").await;

    let error = next_of_type(&mut ws, "error").await;
    assert_eq!(error, json!({ "type": "error", "message": "Wrong token!", "code": 401 }));

    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4003),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_room_relay() {
    let (addr, router) = start().await;
    let mut alice = connect(addr, "/chat?token=alice:s3cret").await;
    let mut bob = connect(addr, "/chat?token=bob:hunter22").await;

    let joined = next_of_type(&mut alice, "user:connected").await;
    assert_eq!(joined["name"], "bob");
    let present = next_of_type(&mut bob, "user:connected").await;
    assert_eq!(present["name"], "alice");
    assert_eq!(router.connection_count(), 2);

    send_json(&mut bob, json!({ "type": "user:message", "text": "hello" })).await;
    let relayed = next_of_type(&mut alice, "chat:message").await;
    assert_eq!(relayed["text"], "hello");
    assert_eq!(relayed["userId"], joined["userId"]);

    bob.close(None).await.unwrap();
    let left = next_of_type(&mut alice, "user:disconnected").await;
    assert_eq!(left["name"], "bob");
}

#[tokio::test]
async fn test_errors_reported_without_closing() {
    let (addr, _router) = start().await;
    let mut ws = connect(addr, "/?token=alice:s3cret").await;

    ws.send(Message::text("not json")).await.unwrap();
    let error = next_of_type(&mut ws, "error").await;
    assert_eq!(error["message"], "Unexpected message payload");

    send_json(&mut ws, json!({ "type": "chat:typing", "chatId": "general" })).await;
    let error = next_of_type(&mut ws, "error").await;
    assert!(error["message"].as_str().unwrap().contains("typing"));

    send_json(&mut ws, json!({ "type": "nope" })).await;
    let error = next_of_type(&mut ws, "error").await;
    assert_eq!(error["message"], "Message not found");
}

#[tokio::test]
async fn test_catalog_and_docs() {
    let (addr, _router) = start().await;

    let (status, body) = http_get(addr, "/asyncapi.json").await;
    assert!(status.contains("200"), "{status}");
    let doc: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["asyncapi"], "2.0.0");
    assert_eq!(doc["servers"]["default"]["url"], format!("ws://{addr}"));
    assert!(doc["channels"]["/chat"]["publish"].is_object());

    let (status, body) = http_get(addr, "/docs").await;
    assert!(status.contains("200"), "{status}");
    assert!(body.contains("asyncapi.json"));
}

#[tokio::test]
async fn test_stats_and_plain_http() {
    let (addr, _router) = start().await;
    let _ws = connect(addr, "/chat?token=alice:s3cret").await;

    // The server finishes the join after the handshake response.
    let mut joined = 0;
    for _ in 0..50 {
        let (status, body) = http_get(addr, "/api/stats").await;
        assert!(status.contains("200"), "{status}");
        let stats: Value = serde_json::from_str(&body).unwrap();
        joined = stats["channels"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["path"] == "/chat")
            .and_then(|c| c["total_connections"].as_u64())
            .unwrap();
        if joined == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(joined, 1);

    let (status, _) = http_get(addr, "/chat").await;
    assert!(status.contains("404"), "{status}");
}

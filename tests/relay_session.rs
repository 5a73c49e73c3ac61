//! Full-client tests against an in-process scripted relay.

use futures_util::{SinkExt, StreamExt};
use peerchat::calls::UnsupportedMediaStack;
use peerchat::{Client, ClientConfig, ClientError};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

async fn bind_relay() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = step(listener.accept()).await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match step(ws.next()).await {
            Some(Ok(Message::Text(raw))) => return serde_json::from_str(&raw).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("relay socket ended unexpectedly: {other:?}"),
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn step<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("test step timed out")
}

fn headless_client(url: String, password: &str) -> Client {
    let mut config = ClientConfig::new(url, "alice", password);
    config.reconnect.base_delay = Duration::from_millis(50);
    let media = Arc::new(UnsupportedMediaStack);
    Client::new(config, media.clone(), media)
}

#[tokio::test]
async fn login_roster_decline_and_reconnect() {
    let (listener, url) = bind_relay().await;
    let client = headless_client(url, "secret");
    let events = client.events();
    let presence = client.presence();
    let calls = client.calls();
    let mut connected = events.connected.subscribe();
    let mut incoming = events.incoming_call.subscribe();
    let run = tokio::spawn(client.run());

    let mut ws = accept_ws(&listener).await;
    let login = next_json(&mut ws).await;
    assert_eq!(login["username"], "alice");
    assert_eq!(login["password"], "secret");
    send_json(
        &mut ws,
        json!({
            "type": "login_success",
            "username": "alice",
            "online_users": ["alice", "bob"],
        }),
    )
    .await;

    let hello = step(connected.recv()).await.unwrap();
    assert_eq!(hello.username, "alice");
    assert!(presence.is_online("bob").await);

    // Ring the client. Without a media stack, accepting has to decline.
    send_json(
        &mut ws,
        json!({"type": "call_incoming", "from": "bob", "callType": "voice"}),
    )
    .await;
    let ring = step(incoming.recv()).await.unwrap();
    assert_eq!(ring.from, "bob");
    calls.accept().await;
    let reject = next_json(&mut ws).await;
    assert_eq!(reject["type"], "call_reject");
    assert_eq!(reject["to"], "bob");

    // Kill the socket; the client logs in again on a fresh one.
    drop(ws);
    let mut ws2 = accept_ws(&listener).await;
    let relogin = next_json(&mut ws2).await;
    assert_eq!(relogin["username"], "alice");

    run.abort();
}

#[tokio::test]
async fn refused_login_is_terminal() {
    let (listener, url) = bind_relay().await;
    let client = headless_client(url, "wrong");
    let run = tokio::spawn(client.run());

    let mut ws = accept_ws(&listener).await;
    let _login = next_json(&mut ws).await;
    send_json(
        &mut ws,
        json!({"type": "error", "msg": "invalid credentials"}),
    )
    .await;

    let result = step(run).await.unwrap();
    assert!(
        matches!(result, Err(ClientError::AuthFailed(ref msg)) if msg == "invalid credentials"),
        "expected auth failure, got {result:?}"
    );
}

#[tokio::test]
async fn unreachable_server_is_not_retried() {
    let (listener, url) = bind_relay().await;
    drop(listener);

    let client = headless_client(url, "secret");
    let result = step(client.run()).await;
    assert!(matches!(result, Err(ClientError::ConnectionFailed)));
}

//! End-to-end tests against a real listener, using a WebSocket client and
//! plain HTTP requests.

use std::net::SocketAddr;
use std::time::Duration;

use courier_relay::RelayConfig;
use courier_server::{CourierServer, ServerConfig};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot_server() -> (SocketAddr, CourierServer) {
    let server = CourierServer::new(ServerConfig::ephemeral(), RelayConfig::default());
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

/// Connect and greet, then wait until the hub reports `sessions` active
/// sessions for `identity`.
async fn subscribe(
    addr: SocketAddr,
    server: &CourierServer,
    identity: &str,
    sessions: usize,
) -> WsStream {
    let (mut ws, _) = connect_async(format!("ws://{addr}/v1/subscribe"))
        .await
        .unwrap();
    ws.send(Message::text(format!("HELLO {identity}")))
        .await
        .unwrap();
    wait_for_sessions(server, identity, Some(sessions)).await;
    ws
}

async fn wait_for_sessions(server: &CourierServer, identity: &str, sessions: Option<usize>) {
    timeout(TIMEOUT, async {
        while server.hub().active_session_counts().get(identity).copied() != sessions {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            return text.to_string();
        }
    }
}

async fn publish(addr: SocketAddr, identity: &str, body: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .put(format!("http://{addr}/v1/publish"))
        .header("Token", identity)
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get_json(addr: SocketAddr, path: &str) -> Value {
    reqwest::get(format!("http://{addr}{path}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn publish_reaches_subscriber() {
    let (addr, server) = boot_server().await;
    let mut ws = subscribe(addr, &server, "alice", 1).await;

    let (status, body) = publish(addr, "alice", "hi there").await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "message published");
    assert_eq!(body["data"], "hi there");

    assert_eq!(next_text(&mut ws).await, "hi there");
    server.shutdown().shutdown();
}

#[tokio::test]
async fn offline_messages_flush_on_subscribe_in_order() {
    let (addr, server) = boot_server().await;

    for body in ["one", "two", "three"] {
        let (status, resp) = publish(addr, "bob", body).await;
        assert_eq!(status, 404);
        assert_eq!(resp["message"], "recipient bob not found");
    }

    let mut ws = subscribe(addr, &server, "bob", 1).await;
    assert_eq!(next_text(&mut ws).await, "one");
    assert_eq!(next_text(&mut ws).await, "two");
    assert_eq!(next_text(&mut ws).await, "three");

    let (status, _) = publish(addr, "bob", "four").await;
    assert_eq!(status, 200);
    assert_eq!(next_text(&mut ws).await, "four");
    assert!(!server.hub().cache().contains("bob"));
    server.shutdown().shutdown();
}

#[tokio::test]
async fn every_session_of_an_identity_receives() {
    let (addr, server) = boot_server().await;
    let mut first = subscribe(addr, &server, "carol", 1).await;
    let mut second = subscribe(addr, &server, "carol", 2).await;

    let (status, _) = publish(addr, "carol", "fan-out").await;
    assert_eq!(status, 200);
    assert_eq!(next_text(&mut first).await, "fan-out");
    assert_eq!(next_text(&mut second).await, "fan-out");

    first.close(None).await.unwrap();
    wait_for_sessions(&server, "carol", Some(1)).await;

    let (status, _) = publish(addr, "carol", "only second").await;
    assert_eq!(status, 200);
    assert_eq!(next_text(&mut second).await, "only second");

    second.close(None).await.unwrap();
    wait_for_sessions(&server, "carol", None).await;
    let (status, _) = publish(addr, "carol", "cached").await;
    assert_eq!(status, 404);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn broadcast_reaches_every_identity() {
    let (addr, server) = boot_server().await;
    let mut dave = subscribe(addr, &server, "dave", 1).await;
    let mut erin = subscribe(addr, &server, "erin", 1).await;

    let resp: Value = reqwest::Client::new()
        .post(format!("http://{addr}/v1/broadcast"))
        .body("attention")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["message"], "message sent to 2 recipients");
    assert_eq!(resp["data"], "attention");

    assert_eq!(next_text(&mut dave).await, "attention");
    assert_eq!(next_text(&mut erin).await, "attention");
    server.shutdown().shutdown();
}

#[tokio::test]
async fn stats_reflect_live_sessions() {
    let (addr, server) = boot_server().await;
    let _a = subscribe(addr, &server, "frank", 1).await;
    let _b = subscribe(addr, &server, "frank", 2).await;
    let _c = subscribe(addr, &server, "grace", 1).await;

    let stats = get_json(addr, "/v1/stats").await;
    assert_eq!(stats["message"], "/v1/stats");
    assert_eq!(stats["data"]["subscribers_count"], 2);

    let sessions = get_json(addr, "/v1/stats/sessions").await;
    assert_eq!(sessions["data"]["subscribers_sessions"]["frank"], 2);
    assert_eq!(sessions["data"]["subscribers_sessions"]["grace"], 1);

    let health = get_json(addr, "/v1/health").await;
    assert_eq!(health["data"], "OK");
    assert_eq!(health["subscribers"], 2);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn unauthenticated_connection_receives_nothing() {
    let (addr, server) = boot_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/v1/subscribe"))
        .await
        .unwrap();
    ws.send(Message::text("HELLO")).await.unwrap();
    ws.send(Message::text("HELLO too many tokens")).await.unwrap();

    let (status, _) = publish(addr, "HELLO", "nope").await;
    assert_eq!(status, 404);
    assert!(server.hub().active_session_counts().is_empty());
    server.shutdown().shutdown();
}

#[tokio::test]
async fn graceful_shutdown_drains_relay_connections() {
    let server = CourierServer::new(ServerConfig::ephemeral(), RelayConfig::default());
    let (addr, listener) = server.listen().await.unwrap();
    let _ivan = subscribe(addr, &server, "ivan", 1).await;
    let _judy = subscribe(addr, &server, "judy", 1).await;
    assert_eq!(server.hub().open_connections(), 2);

    let report = server
        .shutdown()
        .graceful_shutdown(server.hub(), listener, Some(TIMEOUT))
        .await;
    assert!(report.is_clean());
    assert_eq!(server.hub().open_connections(), 0);
    assert!(server.hub().active_session_counts().is_empty());
}

#[tokio::test]
async fn shutdown_closes_open_sockets() {
    let (addr, server) = boot_server().await;
    let mut ws = subscribe(addr, &server, "heidi", 1).await;

    server.shutdown().shutdown();
    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

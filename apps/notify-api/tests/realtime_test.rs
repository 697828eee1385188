mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: start an actual TCP server for WebSocket testing.
/// Returns (addr, state). The server runs in the background.
async fn start_server() -> (SocketAddr, notify_api::AppState) {
    let (app, state) = common::test_app();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Helper: open a connection with the credential in the query string and
/// consume the `connected` acknowledgement.
async fn connect(addr: SocketAddr, user_id: &str) -> WsStream {
    let token = common::mint_test_token(user_id);
    let url = format!("ws://{addr}/ws?token={token}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let (event, data) = recv_event(&mut ws).await;
    assert_eq!(event, "connected");
    assert_eq!(data["user_id"], user_id);
    assert!(data["connection_id"]
        .as_str()
        .unwrap()
        .starts_with("conn_"));

    ws
}

/// Helper: read frames until the next text event arrives.
async fn recv_event(ws: &mut WsStream) -> (String, serde_json::Value) {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");

        if let tungstenite::Message::Text(text) = msg {
            let value: serde_json::Value = serde_json::from_str(&text).expect("parse event");
            return (
                value["event"].as_str().expect("event name").to_string(),
                value["data"].clone(),
            );
        }
    }
}

/// Helper: assert that no frame arrives within a short window.
async fn assert_silent(ws: &mut WsStream) {
    let result = time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected silence, got {result:?}");
}

/// Helper: send a client event frame.
async fn send_event(ws: &mut WsStream, event: serde_json::Value) {
    ws.send(tungstenite::Message::Text(event.to_string().into()))
        .await
        .expect("send client event");
}

/// Helper: ping/pong round trip. Because client messages are handled in
/// order, a pong proves every earlier message (e.g. a subscribe) landed.
async fn ping_barrier(ws: &mut WsStream) {
    send_event(ws, serde_json::json!({"event": "ping"})).await;
    let (event, _) = recv_event(ws).await;
    assert_eq!(event, "pong");
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_with_query_token_gets_acknowledged() {
    let (addr, state) = start_server().await;

    let ws = connect(addr, "usr_ws1").await;
    assert!(state.registry.is_connected("usr_ws1"));
    assert_eq!(state.registry.count_connected_users(), 1);

    drop(ws);
}

#[tokio::test]
async fn connect_with_authorization_header_works() {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let (addr, _state) = start_server().await;
    let token = common::mint_test_token("usr_ws2");

    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {token}").parse().unwrap(),
    );

    let (mut ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect");
    let (event, data) = recv_event(&mut ws).await;
    assert_eq!(event, "connected");
    assert_eq!(data["user_id"], "usr_ws2");
}

#[tokio::test]
async fn connect_without_credentials_is_rejected() {
    let (addr, state) = start_server().await;

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect_err("handshake should fail");
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("unexpected error: {other:?}"),
    }

    // No half-registered connection is left behind.
    assert_eq!(state.registry.count_connected_users(), 0);
}

#[tokio::test]
async fn connect_with_expired_token_is_rejected() {
    let (addr, state) = start_server().await;
    let token = common::mint_expired_token("usr_ws3");

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .expect_err("handshake should fail");
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(state.registry.count_connected_users(), 0);
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let (addr, _state) = start_server().await;
    let mut ws = connect(addr, "usr_ping").await;
    ping_barrier(&mut ws).await;
}

#[tokio::test]
async fn disconnect_unregisters_the_connection() {
    let (addr, state) = start_server().await;
    let mut ws = connect(addr, "usr_gone").await;
    assert!(state.registry.is_connected("usr_gone"));

    ws.close(None).await.expect("close");

    // The unregister runs on the server task; poll briefly.
    for _ in 0..50 {
        if !state.registry.is_connected("usr_gone") {
            break;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!state.registry.is_connected("usr_gone"));
    assert_eq!(state.registry.count_connected_users(), 0);
}

// ---------------------------------------------------------------------------
// Delivery fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn notification_reaches_every_tab_of_the_target_user() {
    let (addr, _state) = start_server().await;

    // Two tabs for alice, one bystander.
    let mut tab1 = connect(addr, "usr_alice").await;
    let mut tab2 = connect(addr, "usr_alice").await;
    let mut other = connect(addr, "usr_bob").await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/api/notifications"))
        .bearer_auth(common::mint_test_token("svc_tasks"))
        .json(&serde_json::json!({
            "user_id": "usr_alice",
            "type": "task_assigned",
            "title": "Review the PR",
            "message": "You were assigned a review"
        }))
        .send()
        .await
        .expect("create notification");
    assert_eq!(resp.status(), 201);

    for tab in [&mut tab1, &mut tab2] {
        let (event, data) = recv_event(tab).await;
        assert_eq!(event, "notification");
        assert_eq!(data["title"], "Review the PR");
        assert_eq!(data["type"], "task_assigned");
        assert_eq!(data["is_read"], false);

        let (event, data) = recv_event(tab).await;
        assert_eq!(event, "unread_count");
        assert_eq!(data["count"], 1);
    }

    // Nothing leaked to another user's connection.
    assert_silent(&mut other).await;
}

#[tokio::test]
async fn suppressed_event_pushes_nothing() {
    let (addr, _state) = start_server().await;
    let mut ws = connect(addr, "usr_bob").await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/api/notifications"))
        .bearer_auth(common::mint_test_token("svc_tasks"))
        .json(&serde_json::json!({
            "user_id": "usr_bob",
            "type": "project_updated",
            "title": "Project changed",
            "message": "Renamed"
        }))
        .send()
        .await
        .expect("create notification");
    assert_eq!(resp.status(), 200);

    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn read_all_pushes_zero_unread_count() {
    let (addr, _state) = start_server().await;
    let mut ws = connect(addr, "usr_alice").await;

    let client = reqwest::Client::new();
    client
        .post(format!("http://{addr}/api/notifications"))
        .bearer_auth(common::mint_test_token("svc_tasks"))
        .json(&serde_json::json!({
            "user_id": "usr_alice",
            "type": "comment_added",
            "title": "New comment",
            "message": "On your task"
        }))
        .send()
        .await
        .expect("create notification");

    let (event, _) = recv_event(&mut ws).await;
    assert_eq!(event, "notification");
    let (event, data) = recv_event(&mut ws).await;
    assert_eq!(event, "unread_count");
    assert_eq!(data["count"], 1);

    let resp = client
        .put(format!("http://{addr}/api/notifications/read-all"))
        .bearer_auth(common::mint_test_token("usr_alice"))
        .send()
        .await
        .expect("read all");
    assert_eq!(resp.status(), 200);

    let (event, data) = recv_event(&mut ws).await;
    assert_eq!(event, "unread_count");
    assert_eq!(data["count"], 0);
}

// ---------------------------------------------------------------------------
// Project rooms
// ---------------------------------------------------------------------------

#[tokio::test]
async fn project_broadcast_reaches_subscribers_until_they_leave() {
    let (addr, _state) = start_server().await;

    let mut member = connect(addr, "usr_alice").await;
    let mut outsider = connect(addr, "usr_bob").await;

    send_event(
        &mut member,
        serde_json::json!({"event": "subscribe_project", "data": "prj_42"}),
    )
    .await;
    ping_barrier(&mut member).await;

    let client = reqwest::Client::new();
    let broadcast = serde_json::json!({
        "project_id": "prj_42",
        "event": "task_updated",
        "data": { "task_id": "tsk_9", "status": "done" }
    });

    let resp = client
        .post(format!("http://{addr}/api/notifications/broadcast"))
        .bearer_auth(common::mint_test_token("svc_tasks"))
        .json(&broadcast)
        .send()
        .await
        .expect("broadcast");
    assert_eq!(resp.status(), 202);

    let (event, data) = recv_event(&mut member).await;
    assert_eq!(event, "task_updated");
    assert_eq!(data["task_id"], "tsk_9");
    assert_silent(&mut outsider).await;

    // After leaving, the same broadcast no longer arrives.
    send_event(
        &mut member,
        serde_json::json!({"event": "unsubscribe_project", "data": "prj_42"}),
    )
    .await;
    ping_barrier(&mut member).await;

    client
        .post(format!("http://{addr}/api/notifications/broadcast"))
        .bearer_auth(common::mint_test_token("svc_tasks"))
        .json(&broadcast)
        .send()
        .await
        .expect("broadcast");

    assert_silent(&mut member).await;
}

#[tokio::test]
async fn disconnected_subscriber_is_excluded_from_broadcast() {
    let (addr, state) = start_server().await;

    let mut member = connect(addr, "usr_alice").await;
    send_event(
        &mut member,
        serde_json::json!({"event": "subscribe_project", "data": "prj_7"}),
    )
    .await;
    ping_barrier(&mut member).await;

    member.close(None).await.expect("close");
    for _ in 0..50 {
        if !state.registry.is_connected("usr_alice") {
            break;
        }
        time::sleep(Duration::from_millis(20)).await;
    }

    // Broadcasting to a room with no live members must simply do nothing.
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/api/notifications/broadcast"))
        .bearer_auth(common::mint_test_token("svc_tasks"))
        .json(&serde_json::json!({
            "project_id": "prj_7",
            "event": "task_updated",
            "data": {}
        }))
        .send()
        .await
        .expect("broadcast");
    assert_eq!(resp.status(), 202);
}

//! Wire-format messages exchanged over a notification connection.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names pushed to clients.
pub struct EventName;

impl EventName {
    pub const CONNECTED: &'static str = "connected";
    pub const NOTIFICATION: &'static str = "notification";
    pub const UNREAD_COUNT: &'static str = "unread_count";
    pub const PONG: &'static str = "pong";
}

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Serialize)]
pub struct ServerMessage<'a> {
    pub event: &'a str,
    pub data: &'a Value,
}

impl<'a> ServerMessage<'a> {
    /// Encode an event as a WebSocket text frame.
    pub fn frame(event: &'a str, data: &'a Value) -> Message {
        let json = serde_json::to_string(&ServerMessage { event, data })
            .expect("server event serialization is infallible");
        Message::Text(json.into())
    }
}

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the room for a project's broadcasts.
    SubscribeProject(String),
    /// Leave a project room.
    UnsubscribeProject(String),
    /// Liveness probe; answered with `pong`.
    Ping,
}

//! WebSocket upgrade handler and per-connection event loop.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::AppState;

use super::events::{ClientMessage, EventName};
use super::registry::OUTBOUND_BUFFER;
use super::rooms::RoomManager;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// Authenticate, then upgrade. The credential comes from the `token` query
/// parameter or the `Authorization` header; a bad credential rejects the
/// attempt before any registry entry exists.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let token = params.token.or_else(|| bearer_token(&headers));
    let Some(token) = token else {
        return ApiError::unauthorized("Missing credentials").into_response();
    };

    let claims = match state.verifier.verify(&token) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    ws.on_upgrade(move |socket| handle_connection(socket, state, claims.sub))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn handle_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let connection_id = state.registry.register(&user_id, tx);

    tracing::info!(%connection_id, %user_id, "connection established");

    // Writer task: drains the outbound queue. It ends once the registry
    // entry (the only sender) is gone, closing the socket behind it.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                return;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    state.registry.send_to(
        &connection_id,
        EventName::CONNECTED,
        &serde_json::json!({
            "message": "Connected to notification service",
            "user_id": user_id,
            "connection_id": connection_id,
        }),
    );

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(?e, %connection_id, "ws read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::SubscribeProject(project_id)) => {
                    state
                        .rooms
                        .join(&connection_id, &RoomManager::project_room(&project_id));
                    tracing::info!(%user_id, %project_id, "subscribed to project");
                }
                Ok(ClientMessage::UnsubscribeProject(project_id)) => {
                    state
                        .rooms
                        .leave(&connection_id, &RoomManager::project_room(&project_id));
                    tracing::info!(%user_id, %project_id, "unsubscribed from project");
                }
                Ok(ClientMessage::Ping) => {
                    state
                        .registry
                        .send_to(&connection_id, EventName::PONG, &serde_json::json!({}));
                }
                Err(_) => {
                    // Unknown or malformed client events are ignored rather
                    // than fatal.
                    tracing::debug!(%connection_id, "ignoring unrecognized client message");
                }
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => continue,
        }
    }

    // Graceful close and abrupt drop funnel through the same idempotent path.
    state.registry.unregister(&connection_id);
    let _ = writer.await;

    tracing::info!(%connection_id, %user_id, "connection closed");
}

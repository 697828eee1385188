//! Connection registry: the shared map of live WebSocket connections.
//!
//! Uses `DashMap` for shard-level concurrency and `parking_lot::Mutex` per
//! entry for non-poisoning, fast locking. Guards from the two maps are never
//! held at the same time, so registry operations cannot deadlock each other.
//!
//! Pushes are fire-and-forget: each connection owns a bounded outbound queue
//! and a connection that stops draining it is unregistered instead of being
//! allowed to stall deliveries to anyone else.

use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use taskline_common::id::{prefix, prefixed_ulid};

use super::events::ServerMessage;

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_BUFFER: usize = 64;

/// State for a single registered connection.
struct ConnectionEntry {
    user_id: String,
    tx: mpsc::Sender<Message>,
    rooms: HashSet<String>,
}

/// Shared registry of all live connections, indexed by connection id and by
/// user id.
///
/// Invariant: a user id key exists in `by_user` iff at least one live
/// connection for that user exists; empty sets are pruned on unregister.
pub struct ConnectionRegistry {
    connections: DashMap<String, Mutex<ConnectionEntry>>,
    by_user: DashMap<String, HashSet<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    /// Register a connection for an authenticated user. Returns the assigned
    /// connection id. The registry takes ownership of the outbound sender;
    /// dropping it (on unregister) lets the writer task wind down.
    pub fn register(&self, user_id: &str, tx: mpsc::Sender<Message>) -> String {
        let connection_id = prefixed_ulid(prefix::CONNECTION);
        self.connections.insert(
            connection_id.clone(),
            Mutex::new(ConnectionEntry {
                user_id: user_id.to_string(),
                tx,
                rooms: HashSet::new(),
            }),
        );
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id.clone());
        connection_id
    }

    /// Remove a connection. Idempotent: unknown or already-removed ids are a
    /// no-op. Room memberships are discarded with the entry.
    pub fn unregister(&self, connection_id: &str) {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            return;
        };
        let user_id = entry.into_inner().user_id;

        if let Some(mut ids) = self.by_user.get_mut(&user_id) {
            ids.remove(connection_id);
            let empty = ids.is_empty();
            drop(ids);
            if empty {
                // Only prune if still empty; a concurrent register may have
                // added a fresh connection in between.
                self.by_user.remove_if(&user_id, |_, ids| ids.is_empty());
            }
        }
    }

    /// Push an event to every live connection of a user. A user with no
    /// connections is a silent no-op; the notification is already persisted
    /// and will be seen on the next pull.
    pub fn push_to_user(&self, user_id: &str, event: &str, data: &Value) {
        let Some(ids) = self
            .by_user
            .get(user_id)
            .map(|ids| ids.iter().cloned().collect::<Vec<_>>())
        else {
            return;
        };

        let msg = ServerMessage::frame(event, data);
        let targets = self.senders_for(&ids);
        let delivered = targets.len();
        self.deliver(targets, msg);
        tracing::debug!(%user_id, event, connections = delivered, "pushed event to user");
    }

    /// Push an event to a single connection (connected ack, pong).
    pub fn send_to(&self, connection_id: &str, event: &str, data: &Value) {
        let Some(tx) = self
            .connections
            .get(connection_id)
            .map(|entry| entry.lock().tx.clone())
        else {
            return;
        };
        let msg = ServerMessage::frame(event, data);
        self.deliver(vec![(connection_id.to_string(), tx)], msg);
    }

    /// Push an event to every connection currently subscribed to a room,
    /// computed as the live union at call time.
    pub fn push_to_room(&self, room: &str, event: &str, data: &Value) {
        let mut targets = Vec::new();
        for item in self.connections.iter() {
            let entry = item.value().lock();
            if entry.rooms.contains(room) {
                targets.push((item.key().clone(), entry.tx.clone()));
            }
        }

        let msg = ServerMessage::frame(event, data);
        let delivered = targets.len();
        self.deliver(targets, msg);
        tracing::debug!(room, event, connections = delivered, "pushed event to room");
    }

    /// Add a room to a connection's subscription set. Idempotent; false when
    /// the connection is unknown.
    pub fn subscribe(&self, connection_id: &str, room: &str) -> bool {
        match self.connections.get(connection_id) {
            Some(entry) => {
                entry.lock().rooms.insert(room.to_string());
                true
            }
            None => false,
        }
    }

    /// Remove a room from a connection's subscription set. Idempotent no-op
    /// when absent.
    pub fn unsubscribe(&self, connection_id: &str, room: &str) {
        if let Some(entry) = self.connections.get(connection_id) {
            entry.lock().rooms.remove(room);
        }
    }

    /// Number of distinct users with at least one live connection.
    pub fn count_connected_users(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.by_user.contains_key(user_id)
    }

    /// Resolve connection ids to their senders, skipping ids that raced an
    /// unregister.
    fn senders_for(&self, ids: &[String]) -> Vec<(String, mpsc::Sender<Message>)> {
        ids.iter()
            .filter_map(|id| {
                self.connections
                    .get(id)
                    .map(|entry| (id.clone(), entry.lock().tx.clone()))
            })
            .collect()
    }

    /// Non-blocking fan-out. A full outbound queue means the consumer has
    /// stalled; the connection is dropped so delivery to others never waits.
    fn deliver(&self, targets: Vec<(String, mpsc::Sender<Message>)>, msg: Message) {
        for (connection_id, tx) in targets {
            match tx.try_send(msg.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        %connection_id,
                        "outbound queue saturated; dropping connection"
                    );
                    self.unregister(&connection_id);
                }
                Err(TrySendError::Closed(_)) => {
                    // Writer already gone; clean up the stale entry.
                    self.unregister(&connection_id);
                }
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

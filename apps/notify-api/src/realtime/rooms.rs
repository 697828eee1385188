//! Room subscriptions: ephemeral, named groupings of connections used for
//! one-to-many broadcast (one room per project).
//!
//! A room has no stored object and no owner; it exists only while at least
//! one live connection has joined it. Membership lives in each connection's
//! registry entry, so disconnecting drops all of a connection's rooms
//! implicitly.

use std::sync::Arc;

use serde_json::Value;

use super::registry::ConnectionRegistry;

pub struct RoomManager {
    registry: Arc<ConnectionRegistry>,
}

impl RoomManager {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The room name for a project's broadcasts.
    pub fn project_room(project_id: &str) -> String {
        format!("project:{project_id}")
    }

    /// Add a connection to a room. Idempotent; joining an unknown connection
    /// is a no-op (it raced a disconnect).
    pub fn join(&self, connection_id: &str, room: &str) {
        if self.registry.subscribe(connection_id, room) {
            tracing::debug!(%connection_id, room, "joined room");
        }
    }

    /// Remove a connection from a room. Idempotent no-op if absent.
    pub fn leave(&self, connection_id: &str, room: &str) {
        self.registry.unsubscribe(connection_id, room);
        tracing::debug!(%connection_id, room, "left room");
    }

    /// Push an event to every connection currently in the room, computed as
    /// the live union at broadcast time.
    pub fn broadcast(&self, room: &str, event: &str, data: &Value) {
        self.registry.push_to_room(room, event, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    fn event_name(msg: Message) -> String {
        let Message::Text(text) = msg else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        value["event"].as_str().unwrap().to_string()
    }

    #[test]
    fn broadcast_reaches_only_room_members() {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomManager::new(Arc::clone(&registry));

        let (tx_in, mut rx_in) = mpsc::channel(8);
        let (tx_out, mut rx_out) = mpsc::channel(8);
        let conn_in = registry.register("usr_a", tx_in);
        let _conn_out = registry.register("usr_b", tx_out);

        let room = RoomManager::project_room("42");
        rooms.join(&conn_in, &room);

        rooms.broadcast(&room, "task_updated", &serde_json::json!({"task_id": "tsk_1"}));

        assert_eq!(event_name(rx_in.try_recv().unwrap()), "task_updated");
        assert!(rx_out.try_recv().is_err());
    }

    #[test]
    fn leaving_or_disconnecting_stops_broadcasts() {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomManager::new(Arc::clone(&registry));

        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let conn1 = registry.register("usr_a", tx1);
        let conn2 = registry.register("usr_b", tx2);

        let room = RoomManager::project_room("42");
        rooms.join(&conn1, &room);
        rooms.join(&conn2, &room);

        rooms.leave(&conn1, &room);
        registry.unregister(&conn2);

        rooms.broadcast(&room, "task_updated", &serde_json::json!({}));
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn broadcast_to_empty_room_is_a_noop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomManager::new(registry);
        rooms.broadcast("project:none", "task_updated", &serde_json::json!({}));
    }

    #[test]
    fn project_room_names_are_namespaced() {
        assert_eq!(RoomManager::project_room("prj_9"), "project:prj_9");
    }
}

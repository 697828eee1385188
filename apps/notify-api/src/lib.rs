pub mod auth;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod store;

use std::sync::Arc;

use auth::jwt::TokenVerifier;
use config::Config;
use delivery::DeliveryEngine;
use realtime::registry::ConnectionRegistry;
use realtime::rooms::RoomManager;
use store::{NotificationStore, PreferenceStore};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomManager>,
    pub delivery: Arc<DeliveryEngine>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the shared state together from its collaborators.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        preferences: Arc<dyn PreferenceStore>,
        verifier: Arc<dyn TokenVerifier>,
        config: Arc<Config>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomManager::new(registry.clone()));
        let delivery = Arc::new(DeliveryEngine::new(
            store.clone(),
            preferences.clone(),
            registry.clone(),
        ));

        Self {
            store,
            preferences,
            verifier,
            registry,
            rooms,
            delivery,
            config,
        }
    }
}

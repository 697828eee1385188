pub mod health;
pub mod notifications;
pub mod preferences;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::realtime::server::router())
        .merge(notifications::router())
        .merge(preferences::router())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Notifications
        notifications::create_notification,
        notifications::list_notifications,
        notifications::mark_as_read,
        notifications::mark_all_as_read,
        notifications::delete_notification,
        notifications::broadcast_to_project,
        // Preferences
        preferences::get_preferences,
        preferences::update_preferences,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::notification::Notification,
            crate::models::notification::NotificationType,
            crate::models::notification::Priority,
            crate::models::preferences::PreferenceUpdate,
            // Route request/response types
            notifications::CreateNotificationRequest,
            notifications::CreateNotificationResponse,
            notifications::SuppressedResponse,
            notifications::ListNotificationsResponse,
            notifications::Pagination,
            notifications::BroadcastRequest,
            preferences::PreferencesResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Notifications", description = "Notification delivery and read state"),
        (name = "Preferences", description = "Per-user notification preferences"),
    )
)]
pub struct ApiDoc;

//! Notification preference endpoints.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::notification::NotificationType;
use crate::models::preferences::{PreferenceUpdate, Preferences};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/notifications/preferences",
        get(get_preferences).put(update_preferences),
    )
}

/// Preference document with every known type flag materialized.
#[derive(Debug, Serialize, ToSchema)]
pub struct PreferencesResponse {
    pub user_id: String,
    pub email_enabled: bool,
    pub push_enabled: bool,
    #[schema(value_type = std::collections::BTreeMap<String, bool>)]
    pub types: BTreeMap<NotificationType, bool>,
}

impl From<Preferences> for PreferencesResponse {
    fn from(prefs: Preferences) -> Self {
        Self {
            types: prefs.materialized_types(),
            user_id: prefs.user_id,
            email_enabled: prefs.email_enabled,
            push_enabled: prefs.push_enabled,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/notifications/preferences",
    tag = "Preferences",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current preferences (defaults on first access)", body = PreferencesResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn get_preferences(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let prefs = state.preferences.get_or_create(&user_id).await?;
    Ok(Json(prefs.into()))
}

#[utoipa::path(
    put,
    path = "/api/notifications/preferences",
    tag = "Preferences",
    security(("bearer" = [])),
    request_body = PreferenceUpdate,
    responses(
        (status = 200, description = "Updated preferences", body = PreferencesResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn update_preferences(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<PreferenceUpdate>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let prefs = state.preferences.update(&user_id, body).await?;
    tracing::info!(%user_id, "notification preferences updated");
    Ok(Json(prefs.into()))
}

//! Notification endpoints: listing, read-state mutations, deletion, and the
//! internal creation/broadcast ingress used by sibling services.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::delivery::DeliveryOutcome;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::notification::{NewNotification, Notification, NotificationType, Priority};
use crate::realtime::rooms::RoomManager;
use crate::store::ListFilter;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notifications",
            get(list_notifications).post(create_notification),
        )
        .route("/api/notifications/read-all", put(mark_all_as_read))
        .route("/api/notifications/broadcast", post(broadcast_to_project))
        .route("/api/notifications/{id}/read", put(mark_as_read))
        .route(
            "/api/notifications/{id}",
            axum::routing::delete(delete_notification),
        )
}

// ---------------------------------------------------------------------------
// POST /api/notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNotificationRequest {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub link: Option<String>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateNotificationResponse {
    pub message: String,
    pub notification: Notification,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SuppressedResponse {
    pub message: String,
    pub suppressed: bool,
}

#[utoipa::path(
    post,
    path = "/api/notifications",
    tag = "Notifications",
    security(("bearer" = [])),
    request_body = CreateNotificationRequest,
    responses(
        (status = 201, description = "Notification created and pushed", body = CreateNotificationResponse),
        (status = 200, description = "Suppressed by user preferences", body = SuppressedResponse),
        (status = 400, description = "Malformed event", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn create_notification(
    AuthUser { user_id: _ }: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateNotificationRequest>,
) -> Result<Response, ApiError> {
    let event = validate_event(body)?;

    match state.delivery.deliver(event).await? {
        DeliveryOutcome::Delivered(notification) => Ok((
            StatusCode::CREATED,
            Json(CreateNotificationResponse {
                message: "Notification created successfully".to_string(),
                notification,
            }),
        )
            .into_response()),
        DeliveryOutcome::Suppressed => Ok((
            StatusCode::OK,
            Json(SuppressedResponse {
                message: "Notification type disabled for user".to_string(),
                suppressed: true,
            }),
        )
            .into_response()),
    }
}

/// Shape-check an inbound event. Nothing is persisted for malformed input.
fn validate_event(body: CreateNotificationRequest) -> Result<NewNotification, ApiError> {
    let mut errors = Vec::new();

    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        errors.push(FieldError {
            field: "user_id".to_string(),
            message: "user_id is required".to_string(),
        });
    }

    let title = body.title.trim();
    match title {
        "" => errors.push(FieldError {
            field: "title".to_string(),
            message: "title is required".to_string(),
        }),
        t if t.len() > 255 => errors.push(FieldError {
            field: "title".to_string(),
            message: "title must be 255 characters or fewer".to_string(),
        }),
        _ => {}
    }

    let message = body.message.trim();
    if message.is_empty() {
        errors.push(FieldError {
            field: "message".to_string(),
            message: "message is required".to_string(),
        });
    }

    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    Ok(NewNotification {
        user_id: user_id.to_string(),
        kind: body.kind,
        title: title.to_string(),
        message: message.to_string(),
        data: body.data.unwrap_or_else(|| serde_json::json!({})),
        link: body.link,
        priority: body.priority.unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// GET /api/notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub unread_only: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
    pub pagination: Pagination,
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "Notifications",
    security(("bearer" = [])),
    params(
        ("unread_only" = Option<bool>, Query, description = "Only unread notifications"),
        ("page" = Option<i64>, Query, description = "1-based page number"),
        ("limit" = Option<i64>, Query, description = "Page size (max 100)"),
    ),
    responses(
        (status = 200, description = "Paginated notifications", body = ListNotificationsResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_notifications(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let unread_only = params.unread_only.unwrap_or(false);

    let filter = ListFilter {
        unread_only,
        offset: (page - 1) * limit,
        limit,
    };

    let page_result = state.store.list(&user_id, filter).await?;
    let unread_count = state.store.unread_count(&user_id).await?;

    let pages = if page_result.total == 0 {
        0
    } else {
        (page_result.total + limit - 1) / limit
    };

    Ok(Json(ListNotificationsResponse {
        notifications: page_result.notifications,
        unread_count,
        pagination: Pagination {
            total: page_result.total,
            page,
            limit,
            pages,
        },
    }))
}

// ---------------------------------------------------------------------------
// PUT /api/notifications/{id}/read
// ---------------------------------------------------------------------------

#[utoipa::path(
    put,
    path = "/api/notifications/{id}/read",
    tag = "Notifications",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Marked as read"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Not found or not owned", body = ApiErrorBody),
    ),
)]
pub async fn mark_as_read(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.delivery.mark_read(&user_id, &id).await?;
    Ok(Json(
        serde_json::json!({ "message": "Notification marked as read" }),
    ))
}

// ---------------------------------------------------------------------------
// PUT /api/notifications/read-all
// ---------------------------------------------------------------------------

#[utoipa::path(
    put,
    path = "/api/notifications/read-all",
    tag = "Notifications",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All notifications marked as read"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn mark_all_as_read(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.delivery.mark_all_read(&user_id).await?;
    Ok(Json(
        serde_json::json!({ "message": "All notifications marked as read" }),
    ))
}

// ---------------------------------------------------------------------------
// DELETE /api/notifications/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    tag = "Notifications",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification deleted"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Not found or not owned", body = ApiErrorBody),
    ),
)]
pub async fn delete_notification(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete(&user_id, &id).await? {
        return Err(ApiError::not_found("Notification not found"));
    }
    tracing::info!(%id, %user_id, "notification deleted");
    Ok(Json(
        serde_json::json!({ "message": "Notification deleted successfully" }),
    ))
}

// ---------------------------------------------------------------------------
// POST /api/notifications/broadcast
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct BroadcastRequest {
    pub project_id: String,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[utoipa::path(
    post,
    path = "/api/notifications/broadcast",
    tag = "Notifications",
    security(("bearer" = [])),
    request_body = BroadcastRequest,
    responses(
        (status = 202, description = "Broadcast dispatched to the project room"),
        (status = 400, description = "Malformed broadcast", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn broadcast_to_project(
    AuthUser { user_id: _ }: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<BroadcastRequest>,
) -> Result<StatusCode, ApiError> {
    let mut errors = Vec::new();
    if body.project_id.trim().is_empty() {
        errors.push(FieldError {
            field: "project_id".to_string(),
            message: "project_id is required".to_string(),
        });
    }
    if body.event.trim().is_empty() {
        errors.push(FieldError {
            field: "event".to_string(),
            message: "event is required".to_string(),
        });
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    state.rooms.broadcast(
        &RoomManager::project_room(body.project_id.trim()),
        body.event.trim(),
        &body.data,
    );

    Ok(StatusCode::ACCEPTED)
}

//! Delivery engine: validate → preference gate → persist → push.
//!
//! The caller is acknowledged as soon as persistence succeeds. Pushes are
//! best-effort: a disconnected or slow consumer never fails the operation,
//! since the unread state is always reconstructable from the store.

use std::sync::Arc;

use chrono::Utc;

use crate::error::ApiError;
use crate::models::notification::{NewNotification, Notification};
use crate::realtime::events::EventName;
use crate::realtime::registry::ConnectionRegistry;
use crate::store::{MarkReadOutcome, NotificationStore, PreferenceStore};

/// Terminal result of a delivery attempt.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Persisted, and pushed to every live connection of the user.
    Delivered(Notification),
    /// The user disabled this notification type: nothing persisted, nothing
    /// pushed, reported as success to the caller.
    Suppressed,
}

pub struct DeliveryEngine {
    notifications: Arc<dyn NotificationStore>,
    preferences: Arc<dyn PreferenceStore>,
    registry: Arc<ConnectionRegistry>,
}

impl DeliveryEngine {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        preferences: Arc<dyn PreferenceStore>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            notifications,
            preferences,
            registry,
        }
    }

    /// Run a validated event through the preference gate, persist it, and
    /// fan it out to the user's live connections.
    pub async fn deliver(&self, event: NewNotification) -> Result<DeliveryOutcome, ApiError> {
        let prefs = self.preferences.get_or_create(&event.user_id).await?;
        if !prefs.is_enabled(event.kind) {
            tracing::debug!(
                user_id = %event.user_id,
                kind = event.kind.as_str(),
                "notification type disabled for user; suppressing"
            );
            return Ok(DeliveryOutcome::Suppressed);
        }

        let notification = self.notifications.create(event).await?;
        tracing::info!(
            id = %notification.id,
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            "notification created"
        );

        if !self.registry.is_connected(&notification.user_id) {
            tracing::debug!(user_id = %notification.user_id, "user has no live connections");
        }

        // Best-effort from here on: the notification exists durably whether
        // or not any socket push lands.
        let payload = serde_json::to_value(&notification)
            .expect("notification serialization is infallible");
        self.registry
            .push_to_user(&notification.user_id, EventName::NOTIFICATION, &payload);
        self.push_unread_count(&notification.user_id).await;

        Ok(DeliveryOutcome::Delivered(notification))
    }

    /// Mark one notification as read and push the recomputed unread count.
    /// Fails with `NotFound` when the notification does not belong to the
    /// caller; already-read notifications are left untouched without a push.
    pub async fn mark_read(&self, user_id: &str, id: &str) -> Result<(), ApiError> {
        match self.notifications.mark_read(user_id, id, Utc::now()).await? {
            MarkReadOutcome::NotFound => Err(ApiError::not_found("Notification not found")),
            MarkReadOutcome::AlreadyRead => Ok(()),
            MarkReadOutcome::Updated => {
                self.push_unread_count(user_id).await;
                Ok(())
            }
        }
    }

    /// Mark everything as read; the new unread count is zero by definition.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<(), ApiError> {
        let changed = self.notifications.mark_all_read(user_id, Utc::now()).await?;
        tracing::info!(%user_id, changed, "marked all notifications as read");

        self.registry.push_to_user(
            user_id,
            EventName::UNREAD_COUNT,
            &serde_json::json!({ "count": 0 }),
        );
        Ok(())
    }

    async fn push_unread_count(&self, user_id: &str) {
        match self.notifications.unread_count(user_id).await {
            Ok(count) => self.registry.push_to_user(
                user_id,
                EventName::UNREAD_COUNT,
                &serde_json::json!({ "count": count }),
            ),
            // Post-persistence failures must not surface to the caller.
            Err(err) => {
                tracing::warn!(?err, %user_id, "failed to recompute unread count for push");
            }
        }
    }
}

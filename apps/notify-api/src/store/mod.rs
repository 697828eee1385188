//! Storage traits for notifications and preferences.
//!
//! Backed by Postgres in production and an in-memory map in tests (and in
//! single-process deployments without a `DATABASE_URL`).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::models::notification::{NewNotification, Notification};
use crate::models::preferences::{PreferenceUpdate, Preferences};

/// Filter and pagination window for listing a user's notifications.
#[derive(Debug, Clone, Copy)]
pub struct ListFilter {
    pub unread_only: bool,
    pub offset: i64,
    pub limit: i64,
}

/// One page of notifications plus the total size of the filtered set.
#[derive(Debug)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: i64,
}

/// Result of a mark-as-read mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    /// No notification with that id belongs to the caller.
    NotFound,
    /// The notification was already read; nothing changed.
    AlreadyRead,
    /// The notification transitioned unread → read.
    Updated,
}

/// Durable record of notifications per user.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, new: NewNotification) -> Result<Notification, ApiError>;

    async fn list(&self, user_id: &str, filter: ListFilter) -> Result<NotificationPage, ApiError>;

    async fn unread_count(&self, user_id: &str) -> Result<i64, ApiError>;

    async fn mark_read(
        &self,
        user_id: &str,
        id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<MarkReadOutcome, ApiError>;

    /// Mark every unread notification as read. Returns how many changed.
    async fn mark_all_read(&self, user_id: &str, read_at: DateTime<Utc>) -> Result<u64, ApiError>;

    /// Delete a notification owned by `user_id`. Returns false when no such
    /// notification exists for that user.
    async fn delete(&self, user_id: &str, id: &str) -> Result<bool, ApiError>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), ApiError>;
}

/// Per-user preference records, created lazily with defaults on first access.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_or_create(&self, user_id: &str) -> Result<Preferences, ApiError>;

    async fn update(
        &self,
        user_id: &str,
        update: PreferenceUpdate,
    ) -> Result<Preferences, ApiError>;
}

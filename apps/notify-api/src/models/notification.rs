use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::notifications;
use crate::error::ApiError;

/// The closed set of notification types the platform emits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TaskAssigned,
    TaskUpdated,
    TaskCompleted,
    CommentAdded,
    ProjectInvite,
    ProjectUpdated,
    Mention,
    System,
}

impl NotificationType {
    /// Every known type, in wire order.
    pub const ALL: [NotificationType; 8] = [
        NotificationType::TaskAssigned,
        NotificationType::TaskUpdated,
        NotificationType::TaskCompleted,
        NotificationType::CommentAdded,
        NotificationType::ProjectInvite,
        NotificationType::ProjectUpdated,
        NotificationType::Mention,
        NotificationType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::TaskAssigned => "task_assigned",
            NotificationType::TaskUpdated => "task_updated",
            NotificationType::TaskCompleted => "task_completed",
            NotificationType::CommentAdded => "comment_added",
            NotificationType::ProjectInvite => "project_invite",
            NotificationType::ProjectUpdated => "project_updated",
            NotificationType::Mention => "mention",
            NotificationType::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<NotificationType> {
        NotificationType::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

/// Delivery priority attached to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Priority> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// A persisted notification as served to clients and pushed over WebSocket.
///
/// Invariant: `read_at` is non-null iff `is_read` is true.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub link: Option<String>,
    pub priority: Priority,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A validated notification event, ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub link: Option<String>,
    pub priority: Priority,
}

// ---------------------------------------------------------------------------
// Diesel rows
// ---------------------------------------------------------------------------

/// Row from the `notifications` table. Type and priority are stored as text
/// and parsed back into their enums on load.
#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub type_: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub link: Option<String>,
    pub priority: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = ApiError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = NotificationType::parse(&row.type_)
            .ok_or_else(|| ApiError::internal("Corrupt notification type in store"))?;
        let priority = Priority::parse(&row.priority)
            .ok_or_else(|| ApiError::internal("Corrupt notification priority in store"))?;
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            kind,
            title: row.title,
            message: row.message,
            data: row.data,
            link: row.link,
            priority,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotificationRow<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub type_: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub data: &'a serde_json::Value,
    pub link: Option<&'a str>,
    pub priority: &'a str,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_round_trips_through_str() {
        for t in NotificationType::ALL {
            assert_eq!(NotificationType::parse(t.as_str()), Some(t));
        }
        assert_eq!(NotificationType::parse("bogus"), None);
    }

    #[test]
    fn type_serde_uses_snake_case() {
        let json = serde_json::to_string(&NotificationType::TaskAssigned).unwrap();
        assert_eq!(json, "\"task_assigned\"");
        let back: NotificationType = serde_json::from_str("\"project_updated\"").unwrap();
        assert_eq!(back, NotificationType::ProjectUpdated);
    }

    #[test]
    fn priority_defaults_to_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(Priority::parse("high"), Some(Priority::High));
        assert_eq!(Priority::parse("urgent"), None);
    }
}

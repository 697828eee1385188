//! In-memory store implementation for tests and databaseless deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use taskline_common::id::{prefix, prefixed_ulid};

use crate::error::ApiError;
use crate::models::notification::{NewNotification, Notification};
use crate::models::preferences::{PreferenceUpdate, Preferences};
use crate::store::{
    ListFilter, MarkReadOutcome, NotificationPage, NotificationStore, PreferenceStore,
};

/// Notifications and preferences held in process memory. Per-user vectors
/// are kept in creation order; listings walk them newest-first.
#[derive(Default)]
pub struct MemoryStore {
    notifications: Mutex<HashMap<String, Vec<Notification>>>,
    preferences: Mutex<HashMap<String, Preferences>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, new: NewNotification) -> Result<Notification, ApiError> {
        let notification = Notification {
            id: prefixed_ulid(prefix::NOTIFICATION),
            user_id: new.user_id.clone(),
            kind: new.kind,
            title: new.title,
            message: new.message,
            data: new.data,
            link: new.link,
            priority: new.priority,
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };

        self.notifications
            .lock()
            .entry(new.user_id)
            .or_default()
            .push(notification.clone());

        Ok(notification)
    }

    async fn list(&self, user_id: &str, filter: ListFilter) -> Result<NotificationPage, ApiError> {
        let store = self.notifications.lock();
        let all = store.get(user_id).map(Vec::as_slice).unwrap_or(&[]);

        let matching: Vec<&Notification> = all
            .iter()
            .rev()
            .filter(|n| !filter.unread_only || !n.is_read)
            .collect();

        let total = matching.len() as i64;
        let notifications = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();

        Ok(NotificationPage {
            notifications,
            total,
        })
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64, ApiError> {
        let store = self.notifications.lock();
        let count = store
            .get(user_id)
            .map(|list| list.iter().filter(|n| !n.is_read).count())
            .unwrap_or(0);
        Ok(count as i64)
    }

    async fn mark_read(
        &self,
        user_id: &str,
        id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<MarkReadOutcome, ApiError> {
        let mut store = self.notifications.lock();
        let Some(list) = store.get_mut(user_id) else {
            return Ok(MarkReadOutcome::NotFound);
        };
        let Some(notification) = list.iter_mut().find(|n| n.id == id) else {
            return Ok(MarkReadOutcome::NotFound);
        };

        if notification.is_read {
            return Ok(MarkReadOutcome::AlreadyRead);
        }
        notification.is_read = true;
        notification.read_at = Some(read_at);
        Ok(MarkReadOutcome::Updated)
    }

    async fn mark_all_read(&self, user_id: &str, read_at: DateTime<Utc>) -> Result<u64, ApiError> {
        let mut store = self.notifications.lock();
        let Some(list) = store.get_mut(user_id) else {
            return Ok(0);
        };

        let mut changed = 0;
        for notification in list.iter_mut().filter(|n| !n.is_read) {
            notification.is_read = true;
            notification.read_at = Some(read_at);
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<bool, ApiError> {
        let mut store = self.notifications.lock();
        let Some(list) = store.get_mut(user_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|n| n.id != id);
        Ok(list.len() < before)
    }

    async fn ping(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get_or_create(&self, user_id: &str) -> Result<Preferences, ApiError> {
        let mut store = self.preferences.lock();
        let prefs = store
            .entry(user_id.to_string())
            .or_insert_with(|| Preferences::with_defaults(user_id));
        Ok(prefs.clone())
    }

    async fn update(
        &self,
        user_id: &str,
        update: PreferenceUpdate,
    ) -> Result<Preferences, ApiError> {
        let mut store = self.preferences.lock();
        let prefs = store
            .entry(user_id.to_string())
            .or_insert_with(|| Preferences::with_defaults(user_id));
        prefs.apply(&update);
        Ok(prefs.clone())
    }
}

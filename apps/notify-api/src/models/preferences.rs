use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::db::schema::notification_preferences;
use crate::error::ApiError;
use crate::models::notification::NotificationType;

/// Per-user notification preferences.
///
/// The `types` map only stores explicit flags; any type absent from the map
/// is implicitly enabled. The lazily-materialized defaults disable
/// `project_updated` and nothing else.
#[derive(Debug, Clone)]
pub struct Preferences {
    pub user_id: String,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub types: BTreeMap<NotificationType, bool>,
}

impl Preferences {
    /// The default preference record materialized on first access.
    pub fn with_defaults(user_id: &str) -> Self {
        let mut types = BTreeMap::new();
        types.insert(NotificationType::ProjectUpdated, false);
        Self {
            user_id: user_id.to_string(),
            email_enabled: true,
            push_enabled: true,
            types,
        }
    }

    /// Whether notifications of `kind` should be persisted and delivered.
    pub fn is_enabled(&self, kind: NotificationType) -> bool {
        self.types.get(&kind).copied().unwrap_or(true)
    }

    /// Merge a partial update into this record.
    pub fn apply(&mut self, update: &PreferenceUpdate) {
        if let Some(email) = update.email_enabled {
            self.email_enabled = email;
        }
        if let Some(push) = update.push_enabled {
            self.push_enabled = push;
        }
        for (kind, enabled) in &update.types {
            self.types.insert(*kind, *enabled);
        }
    }

    /// The full type→flag map with every known type present, for API
    /// responses.
    pub fn materialized_types(&self) -> BTreeMap<NotificationType, bool> {
        NotificationType::ALL
            .iter()
            .map(|t| (*t, self.is_enabled(*t)))
            .collect()
    }
}

/// Partial preference update accepted by `PUT /api/notifications/preferences`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PreferenceUpdate {
    pub email_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    #[serde(default)]
    #[schema(value_type = std::collections::BTreeMap<String, bool>)]
    pub types: BTreeMap<NotificationType, bool>,
}

// ---------------------------------------------------------------------------
// Diesel rows
// ---------------------------------------------------------------------------

/// Row from the `notification_preferences` table. Explicit type flags are a
/// jsonb document so new notification types never need a migration.
#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = notification_preferences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PreferenceRow {
    pub user_id: String,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub type_flags: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PreferenceRow> for Preferences {
    type Error = ApiError;

    fn try_from(row: PreferenceRow) -> Result<Self, Self::Error> {
        let types: BTreeMap<NotificationType, bool> = serde_json::from_value(row.type_flags)
            .map_err(|err| {
                tracing::error!(?err, user_id = %row.user_id, "corrupt preference flags");
                ApiError::internal("Corrupt preference record in store")
            })?;
        Ok(Preferences {
            user_id: row.user_id,
            email_enabled: row.email_enabled,
            push_enabled: row.push_enabled,
            types,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notification_preferences)]
pub struct NewPreferenceRow<'a> {
    pub user_id: &'a str,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub type_flags: &'a serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

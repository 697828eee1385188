//! Postgres-backed store implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;

use taskline_common::id::{prefix, prefixed_ulid};

use crate::db::pool::DbPool;
use crate::db::schema::{notification_preferences, notifications};
use crate::error::ApiError;
use crate::models::notification::{
    NewNotification, NewNotificationRow, Notification, NotificationRow,
};
use crate::models::preferences::{NewPreferenceRow, PreferenceRow, PreferenceUpdate, Preferences};
use crate::store::{
    ListFilter, MarkReadOutcome, NotificationPage, NotificationStore, PreferenceStore,
};

pub struct PgNotificationStore {
    pool: DbPool,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, new: NewNotification) -> Result<Notification, ApiError> {
        let mut conn = self.pool.get().await?;

        let id = prefixed_ulid(prefix::NOTIFICATION);
        let now = Utc::now();
        let data = new.data;

        let row: NotificationRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(notifications::table)
                .values(NewNotificationRow {
                    id: &id,
                    user_id: &new.user_id,
                    type_: new.kind.as_str(),
                    title: &new.title,
                    message: &new.message,
                    data: &data,
                    link: new.link.as_deref(),
                    priority: new.priority.as_str(),
                    is_read: false,
                    read_at: None,
                    created_at: now,
                })
                .returning(NotificationRow::as_returning()),
            &mut conn,
        )
        .await?;

        row.try_into()
    }

    async fn list(&self, user_id: &str, filter: ListFilter) -> Result<NotificationPage, ApiError> {
        let mut conn = self.pool.get().await?;

        let mut count_query = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .count()
            .into_boxed();
        let mut list_query = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .select(NotificationRow::as_select())
            .order(notifications::created_at.desc())
            .into_boxed();

        if filter.unread_only {
            count_query = count_query.filter(notifications::is_read.eq(false));
            list_query = list_query.filter(notifications::is_read.eq(false));
        }

        let total: i64 = diesel_async::RunQueryDsl::get_result(count_query, &mut conn).await?;

        let rows: Vec<NotificationRow> = diesel_async::RunQueryDsl::load(
            list_query.offset(filter.offset).limit(filter.limit),
            &mut conn,
        )
        .await?;

        let notifications = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NotificationPage {
            notifications,
            total,
        })
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64, ApiError> {
        let mut conn = self.pool.get().await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::is_read.eq(false))
                .count(),
            &mut conn,
        )
        .await?;

        Ok(count)
    }

    async fn mark_read(
        &self,
        user_id: &str,
        id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<MarkReadOutcome, ApiError> {
        let mut conn = self.pool.get().await?;

        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                notifications::table
                    .filter(notifications::id.eq(id))
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::is_read.eq(false)),
            )
            .set((
                notifications::is_read.eq(true),
                notifications::read_at.eq(read_at),
            )),
            &mut conn,
        )
        .await?;

        if updated > 0 {
            return Ok(MarkReadOutcome::Updated);
        }

        // Nothing changed: either the row is already read or it isn't ours.
        let exists: Option<String> = diesel_async::RunQueryDsl::get_result(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::user_id.eq(user_id))
                .select(notifications::id),
            &mut conn,
        )
        .await
        .optional()?;

        Ok(if exists.is_some() {
            MarkReadOutcome::AlreadyRead
        } else {
            MarkReadOutcome::NotFound
        })
    }

    async fn mark_all_read(&self, user_id: &str, read_at: DateTime<Utc>) -> Result<u64, ApiError> {
        let mut conn = self.pool.get().await?;

        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                notifications::table
                    .filter(notifications::user_id.eq(user_id))
                    .filter(notifications::is_read.eq(false)),
            )
            .set((
                notifications::is_read.eq(true),
                notifications::read_at.eq(read_at),
            )),
            &mut conn,
        )
        .await?;

        Ok(updated as u64)
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<bool, ApiError> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(
                notifications::table
                    .filter(notifications::id.eq(id))
                    .filter(notifications::user_id.eq(user_id)),
            ),
            &mut conn,
        )
        .await?;

        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<(), ApiError> {
        let mut conn = self.pool.get().await?;
        diesel_async::RunQueryDsl::execute(diesel::sql_query("SELECT 1"), &mut conn).await?;
        Ok(())
    }
}

pub struct PgPreferenceStore {
    pool: DbPool,
}

impl PgPreferenceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(
        &self,
        conn: &mut diesel_async::pooled_connection::deadpool::Object<
            diesel_async::AsyncPgConnection,
        >,
        user_id: &str,
    ) -> Result<Option<Preferences>, ApiError> {
        let row: Option<PreferenceRow> = diesel_async::RunQueryDsl::get_result(
            notification_preferences::table
                .find(user_id)
                .select(PreferenceRow::as_select()),
            conn,
        )
        .await
        .optional()?;

        row.map(Preferences::try_from).transpose()
    }
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn get_or_create(&self, user_id: &str) -> Result<Preferences, ApiError> {
        let mut conn = self.pool.get().await?;

        if let Some(prefs) = self.load(&mut conn, user_id).await? {
            return Ok(prefs);
        }

        // First touch: materialize the defaults. A concurrent first touch
        // wins the insert race; do_nothing and re-read either way.
        let defaults = Preferences::with_defaults(user_id);
        let flags = serde_json::to_value(&defaults.types)
            .map_err(|_| ApiError::internal("serialization"))?;
        let now = Utc::now();

        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(notification_preferences::table)
                .values(NewPreferenceRow {
                    user_id,
                    email_enabled: defaults.email_enabled,
                    push_enabled: defaults.push_enabled,
                    type_flags: &flags,
                    created_at: now,
                    updated_at: now,
                })
                .on_conflict(notification_preferences::user_id)
                .do_nothing(),
            &mut conn,
        )
        .await?;

        self.load(&mut conn, user_id)
            .await?
            .ok_or_else(|| ApiError::persistence("Preference record vanished after insert"))
    }

    async fn update(
        &self,
        user_id: &str,
        update: PreferenceUpdate,
    ) -> Result<Preferences, ApiError> {
        let mut prefs = self.get_or_create(user_id).await?;
        prefs.apply(&update);

        let flags = serde_json::to_value(&prefs.types)
            .map_err(|_| ApiError::internal("serialization"))?;

        let mut conn = self.pool.get().await?;
        diesel_async::RunQueryDsl::execute(
            diesel::update(notification_preferences::table.find(user_id)).set((
                notification_preferences::email_enabled.eq(prefs.email_enabled),
                notification_preferences::push_enabled.eq(prefs.push_enabled),
                notification_preferences::type_flags.eq(&flags),
                notification_preferences::updated_at.eq(Utc::now()),
            )),
            &mut conn,
        )
        .await?;

        Ok(prefs)
    }
}

//! Notification cache

use sqlx::Sqlite;
use sqlx::query_builder::Separated;
use std::ops::Deref;
use std::sync::Arc;

use crate::config::{AppConfig, DatabaseConfig, TableConfig};
use crate::data::{AccountId, Notification, NotificationField};
use crate::engine::{CacheEngine, CacheEntity, ReadQuery};
use crate::error::Result;
use crate::storage::NoSideResources;

/// Table strategy for [`Notification`] rows
pub struct NotificationsEntity;

impl CacheEntity for NotificationsEntity {
    type Record = Notification;
    type Field = NotificationField;

    const KEY_COLUMN: &'static str = "facebook_id";
    const GROUP_COLUMN: &'static str = "account_id";
    const ORDER_COLUMN: &'static str = "updated_time";
    const COLUMNS: &'static [&'static str] = &[
        "facebook_id",
        "account_id",
        "from_str",
        "to_str",
        "created_time",
        "updated_time",
        "title",
        "link",
    ];

    fn column_definitions() -> &'static str {
        "facebook_id TEXT PRIMARY KEY NOT NULL, \
         account_id INTEGER NOT NULL, \
         from_str TEXT NOT NULL, \
         to_str TEXT NOT NULL, \
         created_time TEXT NOT NULL, \
         updated_time TEXT NOT NULL, \
         title TEXT NOT NULL, \
         link TEXT NOT NULL"
    }

    fn natural_key(record: &Notification) -> &str {
        &record.facebook_id
    }

    fn group_key(record: &Notification) -> AccountId {
        record.account_id
    }

    fn bind_values(record: &Notification, row: &mut Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(record.facebook_id.clone())
            .push_bind(record.account_id)
            .push_bind(record.from.clone())
            .push_bind(record.to.clone())
            .push_bind(record.created_time)
            .push_bind(record.updated_time)
            .push_bind(record.title.clone())
            .push_bind(record.link.clone());
    }

    fn field_column(field: NotificationField) -> &'static str {
        match field {}
    }
}

/// Cache of notifications per account
///
/// Dereferences to the underlying [`CacheEngine`] for `sync`, status,
/// waiting and events.
pub struct NotificationsCache {
    engine: CacheEngine<NotificationsEntity>,
}

impl NotificationsCache {
    pub async fn open(config: &AppConfig) -> Result<Self> {
        Self::open_with(&config.database, config.notifications.clone()).await
    }

    pub async fn open_with(database: &DatabaseConfig, table: TableConfig) -> Result<Self> {
        let engine = CacheEngine::open(database, table, Arc::new(NoSideResources)).await?;
        Ok(Self { engine })
    }

    pub fn add_notification(&self, notification: Notification) {
        self.engine.enqueue_insert(notification);
    }

    pub fn remove_notification(&self, facebook_id: impl Into<String>) {
        self.engine.enqueue_remove(facebook_id);
    }

    /// Remove every notification of `account`.
    pub fn remove_notifications(&self, account: AccountId) {
        self.engine.enqueue_remove_group(account);
    }

    /// Schedule a read of `account`'s notifications, newest first.
    pub fn query_notifications(&self, account: AccountId) -> u64 {
        self.engine.query(ReadQuery::group(account))
    }

    /// Schedule a read of every account's notifications.
    pub fn query_all_notifications(&self) -> u64 {
        self.engine.query(ReadQuery::all())
    }

    /// Notifications from the last completed query
    pub fn notifications(&self) -> Arc<Vec<Notification>> {
        self.engine.results()
    }

    /// Read `account`'s notifications now, bypassing the result set.
    pub async fn fetch_notifications(&self, account: Option<AccountId>) -> Result<Vec<Notification>> {
        let query = account.map(ReadQuery::group).unwrap_or_default();
        self.engine.fetch(query).await
    }

    pub fn engine(&self) -> &CacheEngine<NotificationsEntity> {
        &self.engine
    }

    pub async fn close(self) -> Result<()> {
        self.engine.close().await
    }
}

impl Deref for NotificationsCache {
    type Target = CacheEngine<NotificationsEntity>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

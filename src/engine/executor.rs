//! Background executor
//!
//! Applies one snapshot to the store in a fixed order:
//! 1. group removals
//! 2. key removals (side resources first)
//! 3. inserts (`INSERT OR REPLACE`), after releasing the stored files of
//!    re-inserted keys
//! 4. field updates
//!
//! Each step runs in its own transaction. A failing step is logged and
//! marks the pass as failed; steps already committed stay committed.

use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use super::entity::CacheEntity;
use super::queue::Snapshot;
use super::status::PassStatus;
use super::ReadQuery;
use crate::config::TableConfig;
use crate::data::{AccountId, Database};
use crate::error::{CacheError, Result};
use crate::storage::SideResources;

/// Conservative bound on host parameters per statement (SQLite < 3.32 limit)
const MAX_BIND_PARAMS: usize = 999;

/// Owns the storage connection of one cache
pub struct Executor<E: CacheEntity> {
    db: Database,
    table: TableConfig,
    side_resources: Arc<dyn SideResources>,
    schema_ready: bool,
    _entity: PhantomData<E>,
}

impl<E: CacheEntity> Executor<E> {
    pub fn new(db: Database, table: TableConfig, side_resources: Arc<dyn SideResources>) -> Self {
        Self {
            db,
            table,
            side_resources,
            schema_ready: false,
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table.table
    }

    /// Connect and create the table on first use; retried every pass until
    /// it succeeds.
    async fn ensure_schema(&mut self) -> Result<()> {
        if self.schema_ready {
            return Ok(());
        }

        let connection = self
            .db
            .pool()
            .acquire()
            .await
            .map_err(CacheError::Connection)?;
        drop(connection);

        self.db
            .prepare_table(&self.table, E::column_definitions())
            .await?;
        self.schema_ready = true;
        Ok(())
    }

    // =========================================================================
    // Write pass
    // =========================================================================

    /// Run one write pass; never returns an error, only a terminal status.
    pub async fn write(&mut self, snapshot: Snapshot<E>) -> PassStatus {
        if let Err(error) = self.ensure_schema().await {
            self.log_failure("schema", &error);
            return PassStatus::Error;
        }

        let mut failed = false;
        let referenced = referenced_paths(&snapshot);

        if !snapshot.group_removals.is_empty() {
            match self.delete_groups(&snapshot.group_removals).await {
                Ok(rows) => tracing::debug!(table = %self.table.table, rows, "Purged groups"),
                Err(error) => {
                    self.log_failure("group_removals", &error);
                    failed = true;
                }
            }
        }

        if !snapshot.removals.is_empty() {
            if !E::SIDE_RESOURCE_COLUMNS.is_empty() {
                if let Err(error) = self
                    .remove_side_resources(&snapshot.removals, &referenced)
                    .await
                {
                    self.log_failure("side_resource_lookup", &error);
                    failed = true;
                }
            }

            match self.delete_keys(&snapshot.removals).await {
                Ok(rows) => tracing::debug!(table = %self.table.table, rows, "Removed rows"),
                Err(error) => {
                    self.log_failure("removals", &error);
                    failed = true;
                }
            }
        }

        if !snapshot.file_cleanups.is_empty() && !E::SIDE_RESOURCE_COLUMNS.is_empty() {
            if let Err(error) = self
                .remove_side_resources(&snapshot.file_cleanups, &referenced)
                .await
            {
                self.log_failure("file_cleanups", &error);
                failed = true;
            }
        }

        if !snapshot.inserts.is_empty() {
            match self.upsert(&snapshot.inserts).await {
                Ok(rows) => tracing::debug!(table = %self.table.table, rows, "Upserted rows"),
                Err(error) => {
                    self.log_failure("inserts", &error);
                    failed = true;
                }
            }
        }

        for (field, updates) in &snapshot.field_updates {
            if let Err(error) = self.update_field(*field, updates).await {
                self.log_failure("field_updates", &error);
                failed = true;
            }
        }

        if failed {
            PassStatus::Error
        } else {
            PassStatus::Finished
        }
    }

    async fn delete_groups(&self, groups: &[AccountId]) -> Result<u64> {
        let prefix = format!(
            "DELETE FROM {} WHERE {} IN (",
            self.table.table,
            E::GROUP_COLUMN
        );
        self.delete_in(&prefix, groups.iter().copied()).await
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<u64> {
        let prefix = format!(
            "DELETE FROM {} WHERE {} IN (",
            self.table.table,
            E::KEY_COLUMN
        );
        self.delete_in(&prefix, keys.iter().cloned()).await
    }

    /// `prefix` is `DELETE ... IN (`; values are bound in chunks inside one
    /// transaction.
    async fn delete_in<T, I>(&self, prefix: &str, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = T>,
        T: for<'q> sqlx::Encode<'q, Sqlite> + sqlx::Type<Sqlite> + Send + 'static,
    {
        let values: Vec<T> = values.into_iter().collect();
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| CacheError::from_sqlx(prefix, e))?;
        let mut affected = 0;

        let mut values = values.into_iter().peekable();
        while values.peek().is_some() {
            let mut query_builder = QueryBuilder::<Sqlite>::new(prefix);
            {
                let mut separated = query_builder.separated(", ");
                for value in values.by_ref().take(MAX_BIND_PARAMS) {
                    separated.push_bind(value);
                }
            }
            query_builder.push(")");

            let sql = query_builder.sql().to_string();
            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| CacheError::from_sqlx(&sql, e))?;
            affected += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| CacheError::from_sqlx(prefix, e))?;
        Ok(affected)
    }

    /// Look up the files stored for `keys` and delete those not in `keep`.
    ///
    /// Only the lookup can fail the step; file deletion failures are logged.
    async fn remove_side_resources(&self, keys: &[String], keep: &HashSet<&str>) -> Result<()> {
        let prefix = format!(
            "SELECT {} FROM {} WHERE {} IN (",
            E::SIDE_RESOURCE_COLUMNS.join(", "),
            self.table.table,
            E::KEY_COLUMN
        );

        for chunk in keys.chunks(MAX_BIND_PARAMS) {
            let mut query_builder = QueryBuilder::<Sqlite>::new(&prefix);
            {
                let mut separated = query_builder.separated(", ");
                for key in chunk {
                    separated.push_bind(key.clone());
                }
            }
            query_builder.push(")");

            let sql = query_builder.sql().to_string();
            let rows = query_builder
                .build()
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| CacheError::from_sqlx(&sql, e))?;

            for row in rows {
                for index in 0..E::SIDE_RESOURCE_COLUMNS.len() {
                    let path: Option<String> = row
                        .try_get(index)
                        .map_err(|e| CacheError::from_sqlx(&sql, e))?;
                    if let Some(path) = path.filter(|p| !p.is_empty() && !keep.contains(p.as_str())) {
                        self.remove_side_resource(Path::new(&path));
                    }
                }
            }
        }

        Ok(())
    }

    fn remove_side_resource(&self, path: &Path) {
        if let Err(source) = self.side_resources.remove(path) {
            let error = CacheError::SideResource {
                path: path.to_path_buf(),
                source,
            };
            tracing::warn!(
                table = %self.table.table,
                error = %error,
                "Failed to remove cached file"
            );
            crate::metrics::SIDE_RESOURCE_FAILURES_TOTAL
                .with_label_values(&[&self.table.table])
                .inc();
        }
    }

    async fn upsert(&self, records: &[E::Record]) -> Result<u64> {
        let prefix = format!(
            "INSERT OR REPLACE INTO {} ({}) ",
            self.table.table,
            E::COLUMNS.join(", ")
        );
        let rows_per_statement = (MAX_BIND_PARAMS / E::COLUMNS.len()).max(1);

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| CacheError::from_sqlx(&prefix, e))?;
        let mut affected = 0;

        for chunk in records.chunks(rows_per_statement) {
            let mut query_builder = QueryBuilder::<Sqlite>::new(&prefix);
            query_builder.push_values(chunk, |mut row, record| {
                E::bind_values(record, &mut row);
            });

            let sql = query_builder.sql().to_string();
            let result = query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| CacheError::from_sqlx(&sql, e))?;
            affected += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| CacheError::from_sqlx(&prefix, e))?;
        Ok(affected)
    }

    async fn update_field(&self, field: E::Field, updates: &[(String, String)]) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            self.table.table,
            E::field_column(field),
            E::KEY_COLUMN
        );

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| CacheError::from_sqlx(&sql, e))?;
        let mut affected = 0;

        for (key, value) in updates {
            let result = sqlx::query(&sql)
                .bind(value)
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(|e| CacheError::from_sqlx(&sql, e))?;
            affected += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| CacheError::from_sqlx(&sql, e))?;

        tracing::debug!(table = %self.table.table, ?field, rows = affected, "Updated field");
        Ok(affected)
    }

    fn log_failure(&self, step: &str, error: &CacheError) {
        match error {
            CacheError::Statement { query, source } => tracing::error!(
                table = %self.table.table,
                step,
                query = %query,
                error = %source,
                "Write step failed"
            ),
            other => tracing::error!(
                table = %self.table.table,
                step,
                kind = other.kind(),
                error = %other,
                "Write step failed"
            ),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Select rows matching `query`, newest first
    pub async fn read(&mut self, query: &ReadQuery) -> Result<Vec<E::Record>> {
        self.ensure_schema().await?;

        let mut query_builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", self.table.table));
        if let Some(group) = query.group {
            query_builder.push(format!(" WHERE {} = ", E::GROUP_COLUMN));
            query_builder.push_bind(group);
        }
        query_builder.push(format!(
            " ORDER BY {} DESC, {} ASC",
            E::ORDER_COLUMN,
            E::KEY_COLUMN
        ));
        if let Some(limit) = query.limit {
            query_builder.push(" LIMIT ");
            query_builder.push_bind(i64::from(limit));
        }

        let sql = query_builder.sql().to_string();
        query_builder
            .build_query_as::<E::Record>()
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| CacheError::from_sqlx(&sql, e))
    }

    /// Select one row by natural key
    pub async fn read_one(&mut self, key: &str) -> Result<Option<E::Record>> {
        self.ensure_schema().await?;

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            self.table.table,
            E::KEY_COLUMN
        );
        sqlx::query_as::<_, E::Record>(&sql)
            .bind(key)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CacheError::from_sqlx(&sql, e))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop and recreate the table
    pub async fn reset(&mut self) -> Result<()> {
        self.db
            .pool()
            .acquire()
            .await
            .map_err(CacheError::Connection)?;
        self.db
            .reset_table(&self.table, E::column_definitions())
            .await?;
        self.schema_ready = true;
        Ok(())
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

/// Side-resource paths the snapshot itself writes; never deleted by it.
fn referenced_paths<E: CacheEntity>(snapshot: &Snapshot<E>) -> HashSet<&str> {
    let inserted = snapshot.inserts.iter().flat_map(|record| E::side_resources(record));
    let updated = snapshot
        .field_updates
        .iter()
        .filter(|(field, _)| E::SIDE_RESOURCE_COLUMNS.contains(&E::field_column(**field)))
        .flat_map(|(_, updates)| updates.iter().map(|(_, path)| path.as_str()));
    inserted.chain(updated).collect()
}

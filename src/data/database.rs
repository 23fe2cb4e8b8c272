//! SQLite database handling
//!
//! Each cache owns one `Database` with a single lazily opened connection.
//! Only the cache worker issues statements through it.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::{DatabaseConfig, TableConfig, UpgradePolicy};
use crate::error::{CacheError, Result};

const VERSIONS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS cache_versions (\
     table_name TEXT PRIMARY KEY, \
     version INTEGER NOT NULL)";

/// Single-connection SQLite handle
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Prepare a lazily connecting handle to the database file
    ///
    /// Creates the parent directory if needed. The file itself is opened
    /// (and created if missing) on the first statement, so an unreachable
    /// store surfaces as a failed pass rather than a failed constructor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open_lazy(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CacheError::Connection(sqlx::Error::Io(e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options);

        tracing::debug!(path = %config.path.display(), "Database handle prepared");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection after outstanding statements finish
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// Create the table if needed, honoring the schema version policy
    ///
    /// # Arguments
    /// * `table` - Table name, version and upgrade policy
    /// * `columns` - Column definitions for `CREATE TABLE`
    pub async fn prepare_table(&self, table: &TableConfig, columns: &str) -> Result<()> {
        self.execute(VERSIONS_TABLE_SQL).await?;

        let stored = self.stored_version(&table.table).await?;
        match stored {
            Some(version) if version != table.version => match table.upgrade {
                UpgradePolicy::Recreate => {
                    tracing::info!(
                        table = %table.table,
                        from = version,
                        to = table.version,
                        "Schema version changed, recreating table"
                    );
                    self.execute(&drop_table_sql(&table.table)).await?;
                }
                UpgradePolicy::Keep => {
                    tracing::info!(
                        table = %table.table,
                        from = version,
                        to = table.version,
                        "Schema version changed, keeping existing table"
                    );
                }
            },
            _ => {}
        }

        self.execute(&create_table_sql(&table.table, columns)).await?;
        self.record_version(table).await?;

        Ok(())
    }

    /// Drop and recreate the table, discarding every row
    pub async fn reset_table(&self, table: &TableConfig, columns: &str) -> Result<()> {
        self.execute(&drop_table_sql(&table.table)).await?;
        self.execute(VERSIONS_TABLE_SQL).await?;
        self.execute(&create_table_sql(&table.table, columns)).await?;
        self.record_version(table).await?;

        tracing::info!(table = %table.table, "Table reset");
        Ok(())
    }

    /// Schema version recorded for `table`, if any
    pub async fn stored_version(&self, table: &str) -> Result<Option<i64>> {
        const QUERY: &str = "SELECT version FROM cache_versions WHERE table_name = ?";

        sqlx::query_scalar::<_, i64>(QUERY)
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CacheError::from_sqlx(QUERY, e))
    }

    async fn record_version(&self, table: &TableConfig) -> Result<()> {
        const QUERY: &str = "INSERT INTO cache_versions (table_name, version) VALUES (?, ?) \
             ON CONFLICT(table_name) DO UPDATE SET version = excluded.version";

        sqlx::query(QUERY)
            .bind(&table.table)
            .bind(table.version)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::from_sqlx(QUERY, e))?;

        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::from_sqlx(sql, e))?;
        Ok(())
    }
}

fn create_table_sql(table: &str, columns: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} ({columns})")
}

fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table}")
}

//! Entity strategy
//!
//! Everything the engine needs to know about one cache table: its columns,
//! how a record binds into a batched insert, which columns point at files
//! that must disappear with the row, and how a row becomes a record.

use sqlx::Sqlite;
use sqlx::query_builder::Separated;
use sqlx::sqlite::SqliteRow;
use std::fmt::Debug;

use crate::data::AccountId;

/// Per-table strategy plugged into [`CacheEngine`](super::CacheEngine)
pub trait CacheEntity: Send + Sync + 'static {
    /// Immutable record stored in the table
    type Record: Clone
        + Debug
        + Send
        + Sync
        + Unpin
        + for<'r> sqlx::FromRow<'r, SqliteRow>
        + 'static;

    /// Columns that can be updated without replacing the record
    type Field: Copy + Ord + Debug + Send + Sync + 'static;

    /// Natural key column (primary key)
    const KEY_COLUMN: &'static str;
    /// Group key column
    const GROUP_COLUMN: &'static str;
    /// Column that orders query results, newest first
    const ORDER_COLUMN: &'static str;
    /// Columns written by an insert, in the order `bind_values` binds them
    const COLUMNS: &'static [&'static str];
    /// Columns holding paths of side resources owned by a row
    const SIDE_RESOURCE_COLUMNS: &'static [&'static str] = &[];

    /// Column definitions for `CREATE TABLE`
    fn column_definitions() -> &'static str;

    fn natural_key(record: &Self::Record) -> &str;

    fn group_key(record: &Self::Record) -> AccountId;

    /// Bind one record as a tuple of `COLUMNS`.
    fn bind_values(record: &Self::Record, row: &mut Separated<'_, '_, Sqlite, &'static str>);

    fn field_column(field: Self::Field) -> &'static str;

    /// Side-resource paths a record refers to
    fn side_resources(_record: &Self::Record) -> Vec<&str> {
        Vec::new()
    }
}

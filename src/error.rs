//! Error types for SocialCache
//!
//! Storage errors never cross the worker boundary into caller threads.
//! The background worker converts them into pass status and log output;
//! only direct lookups and maintenance calls return `CacheError`.

use std::path::PathBuf;
use thiserror::Error;

/// Cache-wide error type
#[derive(Debug, Error)]
pub enum CacheError {
    /// Storage unreachable or misconfigured
    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// Malformed batch or constraint violation
    #[error("Statement failed: {query}: {source}")]
    Statement {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    /// Failed to delete a file associated with a removed row
    #[error("Side resource error for {}: {source}", path.display())]
    SideResource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The background worker is gone
    #[error("Cache worker has shut down")]
    Closed,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CacheError {
    /// Classify a sqlx error raised while running `query`.
    ///
    /// I/O, TLS, configuration and pool failures mean the store itself could
    /// not be reached; everything else is blamed on the statement.
    pub fn from_sqlx(query: impl Into<String>, error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => CacheError::Connection(error),
            other => CacheError::Statement {
                query: query.into(),
                source: other,
            },
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Connection(_) => "connection",
            CacheError::Statement { .. } => "statement",
            CacheError::SideResource { .. } => "side_resource",
            CacheError::Config(_) => "config",
            CacheError::Closed => "closed",
            CacheError::Internal(_) => "internal",
        }
    }
}

impl From<config::ConfigError> for CacheError {
    fn from(err: config::ConfigError) -> Self {
        CacheError::Config(err.to_string())
    }
}

/// Result type alias using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_connection_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = CacheError::from_sqlx("SELECT 1", sqlx::Error::Io(io));
        assert!(matches!(error, CacheError::Connection(_)));
        assert_eq!(error.kind(), "connection");
    }

    #[test]
    fn row_errors_keep_the_query_text() {
        let error = CacheError::from_sqlx("DELETE FROM images", sqlx::Error::RowNotFound);
        match error {
            CacheError::Statement { query, .. } => assert_eq!(query, "DELETE FROM images"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

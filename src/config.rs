//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub notifications: TableConfig,
    pub images: ImagesConfig,
    pub logging: LoggingConfig,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
    /// How long a connection waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// What to do when the stored schema version differs from the configured one
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpgradePolicy {
    /// Drop the table and create it again (cached data is disposable)
    #[default]
    Recreate,
    /// Keep the existing table and only record the new version
    Keep,
}

/// Per-table configuration handed to each cache at construction
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    /// Table name (plain SQL identifier)
    pub table: String,
    /// Schema version of the table layout
    #[serde(default = "default_schema_version")]
    pub version: i64,
    #[serde(default)]
    pub upgrade: UpgradePolicy,
}

impl TableConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            version: default_schema_version(),
            upgrade: UpgradePolicy::default(),
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn with_upgrade(mut self, upgrade: UpgradePolicy) -> Self {
        self.upgrade = upgrade;
        self
    }

    /// Table names are spliced into SQL text, so only identifiers pass.
    pub fn validate(&self) -> Result<(), crate::error::CacheError> {
        if !is_sql_identifier(&self.table) {
            return Err(crate::error::CacheError::Config(format!(
                "invalid table name: {:?}",
                self.table
            )));
        }

        if self.version < 1 {
            return Err(crate::error::CacheError::Config(format!(
                "schema version for {} must be at least 1",
                self.table
            )));
        }

        Ok(())
    }
}

fn default_schema_version() -> i64 {
    1
}

/// Image cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    #[serde(flatten)]
    pub table: TableConfig,
    /// Directory holding downloaded thumbnails and images
    pub files_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (SOCIALCACHE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::CacheError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("database.path", "data/socialcache.db")?
            .set_default("database.busy_timeout_ms", 5000)?
            .set_default("notifications.table", "notifications")?
            .set_default("notifications.version", 1)?
            .set_default("notifications.upgrade", "recreate")?
            .set_default("images.table", "images")?
            .set_default("images.version", 1)?
            .set_default("images.upgrade", "recreate")?
            .set_default("images.files_dir", "data/images")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("SOCIALCACHE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::CacheError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::CacheError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::CacheError> {
        self.notifications.validate()?;
        self.images.table.validate()?;

        if self.notifications.table == self.images.table.table {
            return Err(crate::error::CacheError::Config(
                "notifications and images must use different tables".to_string(),
            ));
        }

        if self.database.busy_timeout_ms == 0 {
            tracing::warn!("database.busy_timeout_ms=0 fails immediately on a locked database");
        }

        Ok(())
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

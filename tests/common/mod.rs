//! Common test utilities for E2E tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use socialcache::config::{
    AppConfig, DatabaseConfig, ImagesConfig, LoggingConfig, TableConfig,
};
use socialcache::data::{AccountId, Image, Notification};
use socialcache::{ImagesCache, NotificationsCache};
use tempfile::TempDir;

/// Both caches over one temporary database
pub struct TestCaches {
    pub config: AppConfig,
    pub images: ImagesCache,
    pub notifications: NotificationsCache,
    pub _temp_dir: TempDir,
}

impl TestCaches {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        std::fs::create_dir_all(&config.images.files_dir).unwrap();

        let images = ImagesCache::open(&config).await.unwrap();
        let notifications = NotificationsCache::open(&config).await.unwrap();

        Self {
            config,
            images,
            notifications,
            _temp_dir: temp_dir,
        }
    }

    /// Close both caches and open them again on the same files.
    pub async fn reopen(self) -> Self {
        let Self {
            config,
            images,
            notifications,
            _temp_dir,
        } = self;
        images.close().await.unwrap();
        notifications.close().await.unwrap();

        Self {
            images: ImagesCache::open(&config).await.unwrap(),
            notifications: NotificationsCache::open(&config).await.unwrap(),
            config,
            _temp_dir,
        }
    }

    /// Write a file under the images directory and return its path.
    pub fn write_file(&self, name: &str) -> std::path::PathBuf {
        let path = self.config.images.files_dir.join(name);
        std::fs::write(&path, b"jpeg").unwrap();
        path
    }
}

pub fn test_config(temp_dir: &TempDir) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            path: temp_dir.path().join("cache.db"),
            busy_timeout_ms: 1_000,
        },
        notifications: TableConfig::new("notifications"),
        images: ImagesConfig {
            table: TableConfig::new("images"),
            files_dir: temp_dir.path().join("files"),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
    }
}

pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn image(url: &str, account: AccountId, minutes: i64) -> Image {
    Image::new(
        url,
        account,
        at(0),
        at(minutes),
        format!("photo {url}"),
        1024,
        768,
        format!("https://cdn.example.com/thumb/{url}"),
    )
}

pub fn notification(id: &str, account: AccountId, minutes: i64) -> Notification {
    Notification::new(
        id,
        account,
        "Alice Example",
        "Bob Example",
        at(0),
        at(minutes),
        format!("Alice commented on your photo {id}"),
        format!("https://www.facebook.com/n/{id}"),
    )
}

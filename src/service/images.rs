//! Image cache
//!
//! Image metadata per account plus the files the downloader stores for each
//! image. Removing an image removes its thumbnail and full-size files.

use sqlx::Sqlite;
use sqlx::query_builder::Separated;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, DatabaseConfig, TableConfig};
use crate::data::{AccountId, Image, ImageField};
use crate::engine::{CacheEngine, CacheEntity, ReadQuery};
use crate::error::Result;
use crate::storage::{LocalFiles, SideResources};

/// Table strategy for [`Image`] rows
pub struct ImagesEntity;

impl CacheEntity for ImagesEntity {
    type Record = Image;
    type Field = ImageField;

    const KEY_COLUMN: &'static str = "image_url";
    const GROUP_COLUMN: &'static str = "account_id";
    const ORDER_COLUMN: &'static str = "updated_time";
    const COLUMNS: &'static [&'static str] = &[
        "image_url",
        "account_id",
        "created_time",
        "updated_time",
        "image_name",
        "width",
        "height",
        "thumbnail_url",
        "thumbnail_file",
        "image_file",
    ];
    const SIDE_RESOURCE_COLUMNS: &'static [&'static str] = &["thumbnail_file", "image_file"];

    fn column_definitions() -> &'static str {
        "image_url TEXT PRIMARY KEY NOT NULL, \
         account_id INTEGER NOT NULL, \
         created_time TEXT NOT NULL, \
         updated_time TEXT NOT NULL, \
         image_name TEXT NOT NULL, \
         width INTEGER NOT NULL, \
         height INTEGER NOT NULL, \
         thumbnail_url TEXT NOT NULL, \
         thumbnail_file TEXT, \
         image_file TEXT"
    }

    fn natural_key(record: &Image) -> &str {
        &record.image_url
    }

    fn group_key(record: &Image) -> AccountId {
        record.account_id
    }

    fn bind_values(record: &Image, row: &mut Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(record.image_url.clone())
            .push_bind(record.account_id)
            .push_bind(record.created_time)
            .push_bind(record.updated_time)
            .push_bind(record.image_name.clone())
            .push_bind(record.width)
            .push_bind(record.height)
            .push_bind(record.thumbnail_url.clone())
            .push_bind(record.thumbnail_file.clone())
            .push_bind(record.image_file.clone());
    }

    fn field_column(field: ImageField) -> &'static str {
        field.as_str()
    }

    fn side_resources(record: &Image) -> Vec<&str> {
        record.local_files().collect()
    }
}

/// Cache of images per account
///
/// Dereferences to the underlying [`CacheEngine`] for status, waiting and
/// events.
pub struct ImagesCache {
    engine: CacheEngine<ImagesEntity>,
}

impl ImagesCache {
    /// Open with the configured table, deleting image files under
    /// `images.files_dir`.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let files: Arc<dyn SideResources> = Arc::new(LocalFiles::new(&config.images.files_dir));
        Self::open_with(&config.database, config.images.table.clone(), files).await
    }

    pub async fn open_with(
        database: &DatabaseConfig,
        table: TableConfig,
        side_resources: Arc<dyn SideResources>,
    ) -> Result<Self> {
        let engine = CacheEngine::open(database, table, side_resources).await?;
        Ok(Self { engine })
    }

    pub fn add_image(&self, image: Image) {
        self.engine.enqueue_insert(image);
    }

    /// Record where the thumbnail of `image_url` was downloaded to.
    pub fn update_image_thumbnail(&self, image_url: impl Into<String>, path: impl Into<PathBuf>) {
        self.update_path(image_url.into(), ImageField::ThumbnailFile, path.into());
    }

    /// Record where the full-size image of `image_url` was downloaded to.
    pub fn update_image_file(&self, image_url: impl Into<String>, path: impl Into<PathBuf>) {
        self.update_path(image_url.into(), ImageField::ImageFile, path.into());
    }

    fn update_path(&self, image_url: String, field: ImageField, path: PathBuf) {
        self.engine
            .enqueue_field_update(image_url, field, path.to_string_lossy().into_owned());
    }

    pub fn remove_image(&self, image_url: impl Into<String>) {
        self.engine.enqueue_remove(image_url);
    }

    pub fn remove_images<I, S>(&self, image_urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for url in image_urls {
            self.engine.enqueue_remove(url);
        }
    }

    /// Remove every image of `account`.
    pub fn purge_account(&self, account: AccountId) {
        self.engine.enqueue_remove_group(account);
    }

    /// Schedule a write pass with everything queued so far.
    pub fn commit(&self) -> u64 {
        self.engine.sync()
    }

    /// Schedule a read of `account`'s images, newest first.
    pub fn query_images(&self, account: AccountId) -> u64 {
        self.engine.query(ReadQuery::group(account))
    }

    /// Images from the last completed query
    pub fn images(&self) -> Arc<Vec<Image>> {
        self.engine.results()
    }

    /// Look up one image as currently stored.
    pub async fn image(&self, account: AccountId, image_url: &str) -> Result<Option<Image>> {
        let image = self.engine.fetch_one(image_url).await?;
        Ok(image.filter(|image| image.account_id == account))
    }

    /// URLs of `account`'s stored images, newest first
    pub async fn image_urls(&self, account: AccountId) -> Result<Vec<String>> {
        let images = self.engine.fetch(ReadQuery::group(account)).await?;
        Ok(images.into_iter().map(|image| image.image_url).collect())
    }

    pub fn engine(&self) -> &CacheEngine<ImagesEntity> {
        &self.engine
    }

    pub async fn close(self) -> Result<()> {
        self.engine.close().await
    }
}

impl Deref for ImagesCache {
    type Target = CacheEngine<ImagesEntity>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

//! Data models
//!
//! Immutable records stored in the cache tables. A record is replaced
//! wholesale on update; single columns change only through the field-update
//! path of the write pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group key shared by every cache (the owning account)
pub type AccountId = i64;

// =============================================================================
// Notification
// =============================================================================

/// Notification fetched from a social network account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    /// Network-side notification id (natural key)
    pub facebook_id: String,
    pub account_id: AccountId,
    /// Sender display name
    #[sqlx(rename = "from_str")]
    pub from: String,
    /// Recipient display name
    #[sqlx(rename = "to_str")]
    pub to: String,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
    pub title: String,
    pub link: String,
}

impl Notification {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        facebook_id: impl Into<String>,
        account_id: AccountId,
        from: impl Into<String>,
        to: impl Into<String>,
        created_time: DateTime<Utc>,
        updated_time: DateTime<Utc>,
        title: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            facebook_id: facebook_id.into(),
            account_id,
            from: from.into(),
            to: to.into(),
            created_time,
            updated_time,
            title: title.into(),
            link: link.into(),
        }
    }
}

/// Notifications have no independently updatable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NotificationField {}

// =============================================================================
// Image
// =============================================================================

/// Image metadata plus the local files downloaded for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    /// Remote image URL (natural key)
    pub image_url: String,
    pub account_id: AccountId,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
    pub image_name: String,
    pub width: i32,
    pub height: i32,
    pub thumbnail_url: String,
    /// Downloaded thumbnail path, once available
    pub thumbnail_file: Option<String>,
    /// Downloaded full image path, once available
    pub image_file: Option<String>,
}

impl Image {
    /// New image without any downloaded files.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image_url: impl Into<String>,
        account_id: AccountId,
        created_time: DateTime<Utc>,
        updated_time: DateTime<Utc>,
        image_name: impl Into<String>,
        width: i32,
        height: i32,
        thumbnail_url: impl Into<String>,
    ) -> Self {
        Self {
            image_url: image_url.into(),
            account_id,
            created_time,
            updated_time,
            image_name: image_name.into(),
            width,
            height,
            thumbnail_url: thumbnail_url.into(),
            thumbnail_file: None,
            image_file: None,
        }
    }

    /// Paths of the local files that belong to this image
    pub fn local_files(&self) -> impl Iterator<Item = &str> {
        self.thumbnail_file
            .as_deref()
            .into_iter()
            .chain(self.image_file.as_deref())
            .filter(|path| !path.is_empty())
    }
}

/// Image columns that the downloader fills in after the row exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageField {
    ThumbnailFile,
    ImageFile,
}

impl ImageField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThumbnailFile => "thumbnail_file",
            Self::ImageFile => "image_file",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_image_has_no_local_files() {
        let image = Image::new("https://img/1", 1, Utc::now(), Utc::now(), "one", 10, 20, "t");
        assert_eq!(image.local_files().count(), 0);
    }

    #[test]
    fn local_files_skips_empty_paths() {
        let mut image = Image::new("https://img/1", 1, Utc::now(), Utc::now(), "one", 10, 20, "t");
        image.thumbnail_file = Some(String::new());
        image.image_file = Some("/cache/1.jpg".to_string());
        assert_eq!(image.local_files().collect::<Vec<_>>(), vec!["/cache/1.jpg"]);
    }
}

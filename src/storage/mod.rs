//! Side-resource storage module
//!
//! Handles files that belong to cached rows (downloaded thumbnails and
//! full-size images) and must be deleted together with them.

mod files;

#[cfg(test)]
pub use files::MockSideResources;
pub use files::{LocalFiles, NoSideResources, SideResources};

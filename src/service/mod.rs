//! Service layer
//!
//! Concrete caches built on the generic engine: one entity strategy and one
//! domain-named handle per table.

mod images;
mod notifications;

pub use images::{ImagesCache, ImagesEntity};
pub use notifications::{NotificationsCache, NotificationsEntity};

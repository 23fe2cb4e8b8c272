//! Data layer module
//!
//! Handles persistence primitives:
//! - Cache records (notifications, images)
//! - SQLite connection and table schema management

mod database;
mod models;

pub use database::Database;
pub use models::*;

//! SocialCache - on-device cache for social network data
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Service Layer                           │
//! │  - NotificationsCache / ImagesCache                         │
//! │  - Entity strategies (columns, binding, side resources)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Cache Engine                            │
//! │  - Pending-operation queue (any thread, no I/O)             │
//! │  - sync(): swap queue into a snapshot under lock            │
//! │  - One worker task per cache: write/read passes in FIFO     │
//! │  - Status tracking, wait(), broadcast events                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx), one connection per cache                  │
//! │  - Versioned tables                                         │
//! │  - Local side-resource files                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `service`: Concrete notification and image caches
//! - `engine`: Generic queue, worker and status machinery
//! - `data`: Records and SQLite schema handling
//! - `storage`: Files owned by cached rows
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;

pub use engine::{CacheEngine, CacheEntity, CacheEvent, PassStatus, ReadQuery};
pub use error::{CacheError, Result};
pub use service::{ImagesCache, NotificationsCache};

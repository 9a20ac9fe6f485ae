//! Core types and shared functionality for shellcache.
//!
//! This crate provides:
//! - Request/response data model and the declared store set
//! - Cache store registry with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod model;

pub use cache::{CacheDb, CachedEntry, SyncObligation};
pub use config::{AppConfig, ConfigError, TRANSLATIONS_SYNC_TAG};
pub use error::Error;
pub use model::{RequestDescriptor, RequestMode, ResponseArtifact, StoreKind, StoreSet};

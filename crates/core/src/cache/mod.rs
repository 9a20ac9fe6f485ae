//! SQLite-backed cache store registry.
//!
//! Holds a set of named, versioned stores mapping request keys to stored
//! responses, plus the pending deferred-sync obligations. Access goes through
//! tokio-rusqlite, so every read and write is an await point and concurrent
//! callers are serialized on the connection thread.
//!
//! - Stores are created on first open/put and removed with all their entries
//! - Lookups are exact-key matches (method + URL, query-sensitive)
//! - WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod obligations;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CachedEntry;
pub use obligations::SyncObligation;

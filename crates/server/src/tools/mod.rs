//! MCP tool implementations.
//!
//! This module contains all tools exposed by the shellcache server.

pub mod clients;
pub mod control;
pub mod fetch;
pub mod push;
pub mod sync;

pub use clients::ClientConnectParams;
pub use fetch::FetchParams;
pub use push::{ClickParams, PushParams};
pub use sync::SyncParams;

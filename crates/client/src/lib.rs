//! Interception layer for shellcache.
//!
//! This crate provides request classification, the network seam, and the
//! strategy dispatcher that resolves intercepted requests against the store
//! registry in `shellcache-core`.

pub mod dispatch;
pub mod fetch;
pub mod strategy;

pub use dispatch::{Dispatcher, ResponseSource, Served};
pub use fetch::{FetchConfig, HttpNetwork, Network};
pub use strategy::{BypassReason, Route, RouteTable, Strategy};

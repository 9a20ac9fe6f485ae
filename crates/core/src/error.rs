//! Unified error types for shellcache.
//!
//! Every variant carries a stable code prefix so host applications can match
//! on it without parsing free-form text.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the interception layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL, unknown sync tag).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unparseable URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Transport-level failure (DNS, connection refused, offline).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Network failed and no cached or synthetic fallback exists.
    #[error("NO_CACHED_RESPONSE: {0}")]
    NoCachedResponse(String),

    /// Pre-warming the static store failed.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),

    /// Version sweep or client claim failed.
    #[error("ACTIVATE_FAILED: {0}")]
    ActivateFailed(String),

    /// Control message with an action nobody handles.
    #[error("UNKNOWN_ACTION: {0}")]
    UnknownAction(String),
}

impl Error {
    /// Whether this error came from the network rather than local state.
    ///
    /// Strategies fall back to cache only for these.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::FetchTimeout(_) | Error::Network(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptEntry(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::CorruptEntry(msg) => (-32002, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::Network(msg) => (-32008, msg.clone()),
            Error::NoCachedResponse(msg) => (-32001, msg.clone()),
            Error::InstallFailed(msg) => (-32013, msg.clone()),
            Error::ActivateFailed(msg) => (-32014, msg.clone()),
            Error::UnknownAction(msg) => (-32601, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

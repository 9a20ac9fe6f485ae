//! Errors local to the shellcache server.
//!
//! Domain failures use `shellcache_core::Error`. These cover the plumbing
//! between tool calls and the background tasks that serve them.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Server plumbing errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The control channel task has stopped.
    #[error("CONTROL_CLOSED: control channel is not running")]
    ControlClosed,

    /// A control handler finished without replying.
    #[error("CONTROL_CLOSED: reply for {0} was dropped")]
    ReplyLost(String),

    /// Tool output could not be serialized.
    #[error("INTERNAL: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        let code = match &err {
            ServerError::ControlClosed | ServerError::ReplyLost(_) => -32015,
            ServerError::Serialize(_) => -32603,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_closed_maps_to_code() {
        let mcp: McpError = ServerError::ControlClosed.into();
        assert_eq!(mcp.code, ErrorCode(-32015));
        assert!(mcp.message.starts_with("CONTROL_CLOSED"));
    }

    #[test]
    fn test_reply_lost_names_action() {
        let err = ServerError::ReplyLost("clear-all-caches".into());
        assert_eq!(err.to_string(), "CONTROL_CLOSED: reply for clear-all-caches was dropped");
    }
}

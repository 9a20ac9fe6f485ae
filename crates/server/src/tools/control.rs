//! control tool implementation.
//!
//! Forwards one message to the control channel and returns its reply verbatim.

use rmcp::{ErrorData as McpError, model::*};

use crate::control::{ControlHandle, ControlMessage};
use crate::error::ServerError;

/// Implementation of the control tool.
pub async fn control_impl(control: &ControlHandle, params: ControlMessage) -> Result<CallToolResult, McpError> {
    let reply = control.send(params).await?;
    let json = serde_json::to_string_pretty(&reply).map_err(ServerError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlChannel;
    use crate::testing::serving;

    #[tokio::test]
    async fn test_control_tool_returns_reply_json() {
        let (registration, _network) = serving().await;
        let control = ControlChannel::spawn(registration);

        let result = control_impl(&control, ControlMessage::new("clearCache")).await.unwrap();
        let text = result.content.first().and_then(|c| c.as_text()).map(|t| t.text.clone()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, serde_json::json!({"success": true}));
    }
}

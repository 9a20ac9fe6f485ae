//! push and notification_click tool implementations.

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::notify::{NotificationDescriptor, NotificationDispatcher};

/// Input parameters for push tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    /// Raw push payload as delivered by the platform. Omit for an empty push.
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PushOutput {
    /// False when the payload was ignored.
    pub shown: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationDescriptor>,
}

/// Input parameters for notification_click tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClickParams {
    pub tag: String,
    /// Action button pressed; omit for a click on the notification body.
    #[serde(default)]
    pub action: Option<String>,
}

/// Implementation of the push tool.
pub async fn push_impl(notify: &NotificationDispatcher, params: PushParams) -> Result<CallToolResult, McpError> {
    let notification = notify.push(params.payload.as_deref().map(str::as_bytes)).await;

    let output = PushOutput { shown: notification.is_some(), notification };
    let json = serde_json::to_string_pretty(&output).map_err(ServerError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Implementation of the notification_click tool.
pub async fn click_impl(notify: &NotificationDispatcher, params: ClickParams) -> Result<CallToolResult, McpError> {
    let outcome = notify.click(&params.tag, params.action.as_deref()).await;
    let json = serde_json::to_string_pretty(&outcome).map_err(ServerError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

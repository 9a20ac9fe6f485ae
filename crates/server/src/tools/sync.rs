//! sync_register and sync_restored tool implementations.

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::Error;

use crate::error::ServerError;
use crate::sync::SyncAgent;

/// Parameters shared by both sync tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Obligation tag, e.g. "background-sync-translations".
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SyncRegisterOutput {
    pub tag: String,
    /// False when the tag was already pending.
    pub created: bool,
}

fn require_tag(params: &SyncParams) -> Result<&str, Error> {
    let tag = params.tag.trim();
    if tag.is_empty() {
        return Err(Error::InvalidInput("tag cannot be empty".into()));
    }
    Ok(tag)
}

/// Implementation of the sync_register tool.
pub async fn register_impl(agent: &SyncAgent, params: SyncParams) -> Result<CallToolResult, McpError> {
    let tag = require_tag(&params)?;
    let created = agent.register(tag).await?;

    let output = SyncRegisterOutput { tag: tag.to_string(), created };
    let json = serde_json::to_string_pretty(&output).map_err(ServerError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Implementation of the sync_restored tool.
pub async fn restored_impl(agent: &SyncAgent, params: SyncParams) -> Result<CallToolResult, McpError> {
    let tag = require_tag(&params)?;
    let outcome = agent.on_restored(tag).await?;

    let json = serde_json::to_string_pretty(&outcome).map_err(ServerError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

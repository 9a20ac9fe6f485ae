//! client_connect tool implementation.
//!
//! Lets the host announce a window so activation and notification clicks have
//! a client to act on.

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::fetch::resolve;
use shellcache_core::{AppConfig, Error};

use crate::error::ServerError;
use crate::lifecycle::Registration;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientConnectParams {
    /// Page the window is showing; paths resolve against the origin.
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    "/".into()
}

/// Implementation of the client_connect tool.
pub async fn connect_impl(
    registration: &Registration, config: &AppConfig, params: ClientConnectParams,
) -> Result<CallToolResult, McpError> {
    let url = resolve(&params.url, &config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;

    let client = registration.connect_client(&url).await;
    let json = serde_json::to_string_pretty(&client).map_err(ServerError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serving;

    #[tokio::test]
    async fn test_connect_is_controlled_by_active_worker() {
        let (registration, _network) = serving().await;

        let result = connect_impl(&registration, &AppConfig::default(), ClientConnectParams { url: default_url() })
            .await
            .unwrap();
        let text = result.content.first().and_then(|c| c.as_text()).map(|t| t.text.clone()).unwrap();
        let client: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(client["controller"], "v1");
        assert_eq!(client["url"], "http://localhost:5000/");
    }
}

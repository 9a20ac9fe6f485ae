//! fetch tool implementation.
//!
//! Runs one request through the interception layer, as if the host application
//! had issued it.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::fetch::resolve;
use shellcache_client::{ResponseSource, Route};
use shellcache_core::{AppConfig, Error, RequestDescriptor, RequestMode};

use crate::error::ServerError;
use crate::lifecycle::Registration;

/// Input parameters for fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Absolute URL, or a path resolved against the application origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Optional Accept header.
    #[serde(default)]
    pub accept: Option<String>,

    /// Treat the request as a top-level page navigation.
    #[serde(default)]
    pub navigate: bool,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for fetch tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FetchOutput {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Body as text when it is valid UTF-8.
    pub body: Option<String>,
    pub body_len: usize,
    pub source: ResponseSource,
    pub route: Route,
}

/// Implementation of the fetch tool.
pub async fn fetch_impl(
    registration: &Registration, config: &AppConfig, params: FetchParams,
) -> Result<CallToolResult, McpError> {
    let input = params.url.trim();
    if input.is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let url = resolve(input, &config.origin).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))?;

    let mut request = RequestDescriptor::new(&params.method, url);
    if let Some(accept) = params.accept {
        request = request.with_accept(accept);
    }
    if params.navigate {
        request = request.with_mode(RequestMode::Navigate);
    }

    let served = registration.handle_fetch(&request).await?;

    let output = FetchOutput {
        url: request.url().to_string(),
        status: served.response.status,
        body: std::str::from_utf8(&served.response.body).ok().map(str::to_string),
        body_len: served.response.body.len(),
        headers: served.response.headers,
        source: served.source,
        route: served.route,
    };

    let json = serde_json::to_string_pretty(&output).map_err(ServerError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serving;

    fn params(url: &str) -> FetchParams {
        FetchParams { url: url.into(), method: default_method(), accept: None, navigate: false }
    }

    fn parse(result: CallToolResult) -> serde_json::Value {
        let text = result.content.first().and_then(|c| c.as_text()).map(|t| t.text.clone()).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_empty_url() {
        let (registration, _network) = serving().await;
        let result = fetch_impl(&registration, &AppConfig::default(), params("  ")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_precached_path_from_cache() {
        let (registration, network) = serving().await;
        network.set_offline(true);

        let result = fetch_impl(&registration, &AppConfig::default(), params("/static/css/styles.css"))
            .await
            .unwrap();
        let output = parse(result);
        assert_eq!(output["status"], 200);
        assert_eq!(output["body"], "asset /static/css/styles.css");
        assert_eq!(output["source"]["kind"], "cache");
        assert_eq!(output["route"], serde_json::json!({"handle": "cache_first"}));
    }

    #[tokio::test]
    async fn test_fetch_navigation_offline_page() {
        let (registration, network) = serving().await;
        network.set_offline(true);
        registration.clear_all().await.unwrap();

        let mut navigate = params("/lessons");
        navigate.navigate = true;
        let output = parse(fetch_impl(&registration, &AppConfig::default(), navigate).await.unwrap());
        assert_eq!(output["status"], 200);
        assert_eq!(output["source"]["kind"], "synthetic");
        assert!(output["body"].as_str().unwrap().contains("Try Again"));
    }
}

//! MCP server handler implementation.
//!
//! Exposes the interception layer, control channel, sync agent and
//! notification dispatcher as tools over one registration.
use std::sync::Arc;

use crate::control::{ControlChannel, ControlHandle, ControlMessage};
use crate::lifecycle::Registration;
use crate::notify::NotificationDispatcher;
use crate::sync::SyncAgent;
use crate::tools::{ClickParams, ClientConnectParams, FetchParams, PushParams, SyncParams};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use shellcache_core::AppConfig;

/// The main MCP server handler for shellcache.
#[derive(Clone)]
pub struct ShellcacheServer {
    config: Arc<AppConfig>,
    registration: Arc<Registration>,
    control: ControlHandle,
    sync: Arc<SyncAgent>,
    notifications: Arc<NotificationDispatcher>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ShellcacheServer {
    /// Create a new server handler around a registration.
    ///
    /// Starts the control channel task, so this must run inside a runtime.
    pub fn new(config: AppConfig, registration: Arc<Registration>) -> Self {
        let mut app_root = config.origin.clone();
        app_root.set_path("/");

        let control = ControlChannel::spawn(registration.clone());
        let sync = Arc::new(SyncAgent::new(registration.clone(), config.clone()));
        let notifications =
            Arc::new(NotificationDispatcher::new(config.app_name.clone(), app_root, registration.clone()));

        Self {
            config: Arc::new(config),
            registration,
            control,
            sync,
            notifications,
            tool_router: Self::tool_router(),
        }
    }

    /// Run one request through the interception layer.
    #[tool(
        description = "Fetch a URL or origin-relative path through the cache layer. Returns status, headers, body and whether the response came from network, cache or a local fallback."
    )]
    async fn fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        crate::tools::fetch::fetch_impl(&self.registration, &self.config, params.0).await
    }

    /// Send a control message.
    #[tool(
        description = "Send a control message: {\"action\": \"activate-now\" | \"clear-all-caches\" | \"report-cache-contents\"}. The legacy names skipWaiting, clearCache and getCacheInfo are accepted."
    )]
    async fn control(&self, params: Parameters<ControlMessage>) -> Result<CallToolResult, McpError> {
        crate::tools::control::control_impl(&self.control, params.0).await
    }

    #[tool(description = "Register a deferred re-fetch for a sync tag. Re-registering a pending tag does nothing.")]
    async fn sync_register(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        crate::tools::sync::register_impl(&self.sync, params.0).await
    }

    #[tool(description = "Signal that connectivity is back for a sync tag. Performs at most one re-fetch.")]
    async fn sync_restored(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        crate::tools::sync::restored_impl(&self.sync, params.0).await
    }

    #[tool(description = "Deliver a push payload (JSON text with optional title, body, tag, actions).")]
    async fn push(&self, params: Parameters<PushParams>) -> Result<CallToolResult, McpError> {
        crate::tools::push::push_impl(&self.notifications, params.0).await
    }

    #[tool(description = "Deliver a click on a displayed notification, optionally on one of its action buttons.")]
    async fn notification_click(&self, params: Parameters<ClickParams>) -> Result<CallToolResult, McpError> {
        crate::tools::push::click_impl(&self.notifications, params.0).await
    }

    #[tool(description = "Announce a client window showing the given page.")]
    async fn client_connect(&self, params: Parameters<ClientConnectParams>) -> Result<CallToolResult, McpError> {
        crate::tools::clients::connect_impl(&self.registration, &self.config, params.0).await
    }
}

impl ServerHandler for ShellcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shellcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serving;

    #[tokio::test]
    async fn test_all_tools_listed() {
        let (registration, _network) = serving().await;
        let server = ShellcacheServer::new(AppConfig::default(), registration);

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["client_connect", "control", "fetch", "notification_click", "push", "sync_register", "sync_restored"]
        );
    }
}

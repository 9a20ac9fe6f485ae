//! shellcache server entry point.
//!
//! Loads configuration, opens the store database, installs the configured
//! worker and serves MCP on stdio. Logging goes to stderr to avoid interfering
//! with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shellcache_client::{FetchConfig, HttpNetwork};
use shellcache_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod control;
mod error;
mod handler;
mod lifecycle;
mod notify;
mod sync;
#[cfg(test)]
mod testing;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, version = %config.version, db = %config.db_path.display(), "starting shellcache on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(HttpNetwork::new(FetchConfig::from(&config))?);
    let registration = Arc::new(lifecycle::Registration::new(db.clone(), network));

    // A failed install leaves requests passing straight through; the host can
    // retry by restarting.
    if let Err(e) = registration.register(config.clone()).await {
        tracing::error!(error = %e, "initial worker did not activate, serving uncontrolled");
    }

    let handler = handler::ShellcacheServer::new(config, registration);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    db.close().await?;
    tracing::info!("store database closed");
    Ok(())
}

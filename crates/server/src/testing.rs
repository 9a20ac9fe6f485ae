//! Shared fixtures for server tests.

use std::sync::Arc;

use shellcache_client::fetch::testing::ScriptedNetwork;
use shellcache_core::{AppConfig, CacheDb, RequestDescriptor, ResponseArtifact};
use url::Url;

use crate::lifecycle::Registration;

pub const ORIGIN: &str = "http://localhost:5000";

pub fn get(path: &str) -> RequestDescriptor {
    RequestDescriptor::get(Url::parse(&format!("{ORIGIN}{path}")).unwrap())
}

/// A registration over an in-memory store whose network serves every
/// manifest entry of `config` with a 200.
pub async fn online(config: &AppConfig) -> (Arc<Registration>, Arc<ScriptedNetwork>) {
    let network = Arc::new(ScriptedNetwork::new());
    for entry in &config.precache {
        let url = config.resolve(entry).unwrap();
        network.respond(url.as_str(), ResponseArtifact::new(200, format!("asset {entry}")));
    }

    let db = CacheDb::open_in_memory().await.unwrap();
    (Arc::new(Registration::new(db, network.clone())), network)
}

/// [`online`] with a worker for the default configuration already active.
pub async fn serving() -> (Arc<Registration>, Arc<ScriptedNetwork>) {
    let config = AppConfig::default();
    let (registration, network) = online(&config).await;
    registration.register(config).await.unwrap();
    (registration, network)
}

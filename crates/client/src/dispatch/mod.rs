//! Interception dispatcher.
//!
//! Every request the host issues goes through [`Dispatcher::handle`]: it is
//! classified, then resolved by one strategy against the store registry and the
//! network. Each strategy is a straight sequence of fallible steps:
//!
//! | Strategy | Steps |
//! |---|---|
//! | cache-first | static store → fetch → recache 2xx (static) |
//! | network-first | fetch → recache 2xx (api) / api store → seed dataset |
//! | navigation | fetch → recache 2xx (general) / any store → app root → offline page |
//! | generic | any store → fetch → recache 2xx (general) |
//!
//! Store writes go through [`Dispatcher::persist`]: the artifact is cloned, the
//! clone is written from a spawned task, and the original goes back to the
//! caller. The spawned write survives the caller going away. Write and read
//! failures are logged and never reach the caller.
//!
//! Writes hold the shared write gate for reading. Whoever retires a dispatcher
//! takes the gate exclusively first, so no write is in flight once
//! [`Dispatcher::retire`] returns and none starts afterwards.

pub mod fallback;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use shellcache_core::{AppConfig, CacheDb, CachedEntry, Error, RequestDescriptor, ResponseArtifact, StoreKind, StoreSet};
use tokio::sync::RwLock;
use url::Url;

use crate::fetch::Network;
use crate::strategy::{Route, RouteTable, Strategy};

/// Where a response came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ResponseSource {
    /// Fetched just now.
    Network,
    /// Served from a store without contacting the network.
    Cache { store: String },
    /// Built locally (seed dataset or offline page).
    Synthetic,
    /// Bypassed the layer and went straight to the network.
    Passthrough,
}

/// A response together with how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: ResponseArtifact,
    pub source: ResponseSource,
    pub route: Route,
}

impl Served {
    fn network(response: ResponseArtifact, route: Route) -> Self {
        Self { response, source: ResponseSource::Network, route }
    }

    fn cached(entry: CachedEntry, route: Route) -> Self {
        Self { response: entry.response, source: ResponseSource::Cache { store: entry.store }, route }
    }

    fn synthetic(response: ResponseArtifact, route: Route) -> Self {
        Self { response, source: ResponseSource::Synthetic, route }
    }
}

/// Strategy executor bound to one declared store set.
pub struct Dispatcher {
    db: CacheDb,
    network: Arc<dyn Network>,
    routes: RouteTable,
    stores: StoreSet,
    app_root: Url,
    primary_endpoint: String,
    sync_resources: BTreeMap<String, String>,
    app_name: String,
    retired: AtomicBool,
    write_gate: Arc<RwLock<()>>,
}

impl Dispatcher {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, config: &AppConfig) -> Self {
        let mut app_root = config.origin.clone();
        app_root.set_path("/");
        app_root.set_query(None);

        Self {
            db,
            network,
            routes: RouteTable::from_config(config),
            stores: config.store_set(),
            app_root,
            primary_endpoint: config.primary_endpoint.clone(),
            sync_resources: config.sync_resources.clone(),
            app_name: config.app_name.clone(),
            retired: AtomicBool::new(false),
            write_gate: Arc::new(RwLock::new(())),
        }
    }

    /// Share `gate` with the other dispatchers over the same store registry.
    pub fn with_write_gate(mut self, gate: Arc<RwLock<()>>) -> Self {
        self.write_gate = gate;
        self
    }

    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    /// Stop writing to stores. In-flight requests still get responses.
    ///
    /// Called when a newer worker takes over so late writes cannot re-create
    /// stores the version sweep has just removed. Hold the write gate
    /// exclusively across this call and the sweep.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Undo [`retire`](Self::retire) after a takeover that did not complete.
    pub fn reinstate(&self) {
        self.retired.store(false, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Resolve one intercepted request.
    ///
    /// Only fails when the chosen strategy has no fallback left: a static asset
    /// neither cached nor reachable, an API path other than the primary
    /// endpoint with nothing cached, or a generic request that cannot be fetched.
    pub async fn handle(&self, request: &RequestDescriptor) -> Result<Served, Error> {
        let route = self.routes.classify(request);
        tracing::debug!(request = %request, ?route, "classified");

        match route {
            Route::Bypass(reason) => {
                tracing::debug!(request = %request, ?reason, "bypassing cache layer");
                let response = self.network.fetch(request).await?;
                Ok(Served { response, source: ResponseSource::Passthrough, route })
            }
            Route::Handle(Strategy::CacheFirst) => self.cache_first(request, route).await,
            Route::Handle(Strategy::NetworkFirst) => self.network_first(request, route).await,
            Route::Handle(Strategy::Navigation) => self.navigation(request, route).await,
            Route::Handle(Strategy::Generic) => self.generic(request, route).await,
        }
    }

    async fn cache_first(&self, request: &RequestDescriptor, route: Route) -> Result<Served, Error> {
        if let Some(entry) = self.lookup_in(StoreKind::Static, request).await {
            return Ok(Served::cached(entry, route));
        }

        let response = self.network.fetch(request).await?;
        if response.is_success() {
            self.persist(StoreKind::Static, request, &response).await;
        }
        Ok(Served::network(response, route))
    }

    async fn network_first(&self, request: &RequestDescriptor, route: Route) -> Result<Served, Error> {
        let err = match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.persist(StoreKind::Api, request, &response).await;
                }
                return Ok(Served::network(response, route));
            }
            Err(err) if err.is_network() => err,
            Err(err) => return Err(err),
        };

        tracing::warn!(request = %request, error = %err, "API fetch failed, falling back to cache");
        self.note_sync_obligation(request).await;

        if let Some(entry) = self.lookup_in(StoreKind::Api, request).await {
            tracing::info!(request = %request, "serving API request from cache");
            return Ok(Served::cached(entry, route));
        }

        if request.url().path() == self.primary_endpoint {
            tracing::info!(request = %request, "serving built-in seed dataset");
            return Ok(Served::synthetic(fallback::seed_response(), route));
        }

        Err(Error::NoCachedResponse(format!("{request}: {err}")))
    }

    async fn navigation(&self, request: &RequestDescriptor, route: Route) -> Result<Served, Error> {
        let err = match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.persist(StoreKind::General, request, &response).await;
                }
                return Ok(Served::network(response, route));
            }
            Err(err) => err,
        };

        tracing::warn!(request = %request, error = %err, "navigation fetch failed, falling back");

        if let Some(entry) = self.lookup_any(request).await {
            return Ok(Served::cached(entry, route));
        }

        let home = RequestDescriptor::get(self.app_root.clone());
        if let Some(entry) = self.lookup_any(&home).await {
            tracing::info!(request = %request, "serving cached app root in place of navigation");
            return Ok(Served::cached(entry, route));
        }

        Ok(Served::synthetic(fallback::offline_page(&self.app_name), route))
    }

    async fn generic(&self, request: &RequestDescriptor, route: Route) -> Result<Served, Error> {
        if let Some(entry) = self.lookup_any(request).await {
            return Ok(Served::cached(entry, route));
        }

        let response = self.network.fetch(request).await?;
        if response.is_success() {
            self.persist(StoreKind::General, request, &response).await;
        }
        Ok(Served::network(response, route))
    }

    async fn lookup_in(&self, kind: StoreKind, request: &RequestDescriptor) -> Option<CachedEntry> {
        let store = self.stores.name(kind);
        match self.db.match_in(store, request).await {
            Ok(hit) => {
                tracing::debug!(request = %request, store, hit = hit.is_some(), "store lookup");
                hit
            }
            Err(e) => {
                tracing::warn!(request = %request, store, error = %e, "store read failed, treating as miss");
                None
            }
        }
    }

    async fn lookup_any(&self, request: &RequestDescriptor) -> Option<CachedEntry> {
        match self.db.match_any(request).await {
            Ok(hit) => {
                tracing::debug!(request = %request, hit = hit.is_some(), "cross-store lookup");
                hit
            }
            Err(e) => {
                tracing::warn!(request = %request, error = %e, "store read failed, treating as miss");
                None
            }
        }
    }

    /// Write a copy of `response` into the store for `kind`.
    async fn persist(&self, kind: StoreKind, request: &RequestDescriptor, response: &ResponseArtifact) {
        let writing = self.write_gate.clone().read_owned().await;
        if self.is_retired() {
            tracing::debug!(request = %request, "worker retired, skipping store write");
            return;
        }

        let db = self.db.clone();
        let store = self.stores.name(kind).to_string();
        let request = request.clone();
        let copy = response.clone();

        let write = tokio::spawn(async move {
            let _writing = writing;
            if let Err(e) = db.put(&store, &request, &copy).await {
                tracing::warn!(request = %request, store, error = %e, "store write failed");
            }
        });

        if let Err(e) = write.await {
            tracing::warn!(error = %e, "store write task did not complete");
        }
    }

    async fn note_sync_obligation(&self, request: &RequestDescriptor) {
        let path = request.url().path();
        let Some((tag, resource)) = self.sync_resources.iter().find(|(_, resource)| resource.as_str() == path) else {
            return;
        };

        match self.db.register_obligation(tag, resource).await {
            Ok(true) => tracing::info!(tag, resource, "registered sync obligation"),
            Ok(false) => tracing::debug!(tag, "sync obligation already pending"),
            Err(e) => tracing::warn!(tag, error = %e, "failed to register sync obligation"),
        }
    }
}

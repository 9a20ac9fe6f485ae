//! Worker lifecycle: install, activate, version sweep, client control.
//!
//! A [`Registration`] owns at most one *active* worker (serving requests) and at
//! most one *waiting* worker (installed, not yet promoted). Registering a new
//! configuration installs a fresh worker next to the active one, so a failed
//! install or activation never interrupts the version already serving.
//!
//! ```text
//! Installing ──ok──▶ Installed ──activate──▶ Activating ──ok──▶ Active
//!     │                  │                        │               │
//!     └──fail──▶ Redundant ◀──replaced──┘   fail──┘    superseded─┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use schemars::JsonSchema;
use serde::Serialize;
use shellcache_client::{BypassReason, Dispatcher, Network, ResponseSource, Route, Served};
use shellcache_core::{AppConfig, CacheDb, Error, RequestDescriptor, StoreSet};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use url::Url;

/// Lifecycle state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Active,
    Redundant,
}

/// One versioned instance of the interception layer.
pub struct Worker {
    id: u64,
    config: AppConfig,
    dispatcher: Arc<Dispatcher>,
    state: RwLock<WorkerState>,
}

impl Worker {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn stores(&self) -> &StoreSet {
        self.dispatcher.stores()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        tracing::info!(worker = self.id, version = %self.config.version, from = ?*state, to = ?next, "worker state change");
        *state = next;
    }
}

/// A connected client window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ClientInfo {
    pub id: String,
    pub url: String,
    /// Version of the worker controlling this client, if any.
    pub controller: Option<String>,
    pub focused: bool,
}

/// What [`Clients::open_or_focus`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowAction {
    Focused(ClientInfo),
    Opened(ClientInfo),
}

/// Registry of connected client windows.
#[derive(Default)]
pub struct Clients {
    windows: RwLock<Vec<ClientInfo>>,
    next_id: AtomicU64,
}

impl Clients {
    fn allocate(&self, url: &Url, controller: Option<String>, focused: bool) -> ClientInfo {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        ClientInfo { id: format!("client-{n}"), url: url.to_string(), controller, focused }
    }

    /// Track a new client window.
    pub async fn connect(&self, url: &Url, controller: Option<String>) -> ClientInfo {
        let client = self.allocate(url, controller, false);
        self.windows.write().await.push(client.clone());
        tracing::debug!(client = %client.id, url = %client.url, "client connected");
        client
    }

    /// Put every client under `version`'s control. Returns how many changed.
    pub async fn claim(&self, version: &str) -> usize {
        let mut windows = self.windows.write().await;
        let mut claimed = 0;
        for client in windows.iter_mut() {
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    /// Focus a window already showing `url`, or open a new one.
    pub async fn open_or_focus(&self, url: &Url, controller: Option<String>) -> WindowAction {
        let mut windows = self.windows.write().await;
        let target = url.as_str();

        if let Some(index) = windows.iter().position(|client| client.url == target) {
            for (i, client) in windows.iter_mut().enumerate() {
                client.focused = i == index;
            }
            return WindowAction::Focused(windows[index].clone());
        }

        for client in windows.iter_mut() {
            client.focused = false;
        }
        let client = self.allocate(url, controller, true);
        windows.push(client.clone());
        WindowAction::Opened(client)
    }

    pub async fn list(&self) -> Vec<ClientInfo> {
        self.windows.read().await.clone()
    }
}

/// Holds the active and waiting workers and everything they share.
pub struct Registration {
    db: CacheDb,
    network: Arc<dyn Network>,
    clients: Clients,
    active: RwLock<Option<Arc<Worker>>>,
    waiting: RwLock<Option<Arc<Worker>>>,
    /// Held shared by every store write, exclusively across retire and sweep.
    write_gate: Arc<RwLock<()>>,
    next_id: AtomicU64,
}

impl Registration {
    pub fn new(db: CacheDb, network: Arc<dyn Network>) -> Self {
        Self {
            db,
            network,
            clients: Clients::default(),
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            write_gate: Arc::new(RwLock::new(())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// Shared with every dispatcher. Hold it for reading while writing a store
    /// outside a dispatcher.
    pub fn write_gate(&self) -> &RwLock<()> {
        &self.write_gate
    }

    pub async fn active(&self) -> Option<Arc<Worker>> {
        self.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<Worker>> {
        self.waiting.read().await.clone()
    }

    /// Install a worker for `config`.
    ///
    /// On success the worker waits, unless nothing is active yet or
    /// `skip_waiting` is set, in which case it is activated right away. The
    /// returned worker's state tells which happened.
    ///
    /// # Errors
    ///
    /// `Error::InstallFailed` when any manifest entry cannot be fetched or
    /// returns a non-2xx status. `Error::ActivateFailed` when the immediate
    /// activation fails. Either way the previously active worker keeps serving.
    pub async fn register(&self, config: AppConfig) -> Result<Arc<Worker>, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let skip_waiting = config.skip_waiting;
        let dispatcher = Dispatcher::new(self.db.clone(), self.network.clone(), &config)
            .with_write_gate(self.write_gate.clone());
        let dispatcher = Arc::new(dispatcher);
        let worker = Arc::new(Worker { id, config, dispatcher, state: RwLock::new(WorkerState::Installing) });

        tracing::info!(worker = id, version = %worker.version(), "installing worker");

        if let Err(e) = self.install(&worker).await {
            tracing::error!(worker = id, error = %e, "install failed");
            worker.set_state(WorkerState::Redundant).await;
            return Err(e);
        }
        worker.set_state(WorkerState::Installed).await;

        if let Some(replaced) = self.waiting.write().await.replace(worker.clone()) {
            tracing::info!(worker = replaced.id, "waiting worker replaced by newer install");
            replaced.set_state(WorkerState::Redundant).await;
        }

        if skip_waiting || self.active.read().await.is_none() {
            self.activate_now().await?;
        }

        Ok(worker)
    }

    /// Pre-warm the static store with the whole manifest, all or nothing.
    ///
    /// No store is created until every manifest entry has been fetched, so a
    /// failed install leaves the registry untouched.
    async fn install(&self, worker: &Worker) -> Result<(), Error> {
        let stores = worker.stores();
        let mut requests = Vec::with_capacity(worker.config.precache.len());
        for entry in &worker.config.precache {
            let url = worker
                .config
                .resolve(entry)
                .map_err(|e| Error::InstallFailed(format!("manifest entry {entry}: {e}")))?;
            requests.push(RequestDescriptor::get(url));
        }

        let mut join_set = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let network = self.network.clone();
            join_set.spawn(async move {
                let result = network.fetch(&request).await;
                (index, request, result)
            });
        }

        let mut fetched = Vec::with_capacity(join_set.len());
        while let Some(joined) = join_set.join_next().await {
            let (index, request, result) = joined.map_err(|e| Error::InstallFailed(e.to_string()))?;
            let response = result.map_err(|e| Error::InstallFailed(format!("{request}: {e}")))?;
            if !response.is_success() {
                return Err(Error::InstallFailed(format!("{request}: status {}", response.status)));
            }
            fetched.push((index, request, response));
        }

        fetched.sort_by_key(|(index, _, _)| *index);
        let entries: Vec<_> = fetched.into_iter().map(|(_, request, response)| (request, response)).collect();

        self.db
            .put_all(&stores.static_assets, &entries)
            .await
            .map_err(|e| Error::InstallFailed(format!("writing manifest: {e}")))?;
        self.db
            .open_store(&stores.api)
            .await
            .map_err(|e| Error::InstallFailed(format!("opening {}: {e}", stores.api)))?;

        tracing::info!(worker = worker.id, store = %stores.static_assets, entries = entries.len(), "manifest pre-warmed");
        Ok(())
    }

    /// Promote the waiting worker, if there is one.
    ///
    /// Returns `Ok(false)` when nothing was waiting.
    pub async fn activate_now(&self) -> Result<bool, Error> {
        let Some(worker) = self.waiting.write().await.take() else {
            tracing::debug!("activate requested with no waiting worker");
            return Ok(false);
        };

        self.activate(worker).await?;
        Ok(true)
    }

    async fn activate(&self, worker: Arc<Worker>) -> Result<(), Error> {
        worker.set_state(WorkerState::Activating).await;

        let prior = self.active().await;
        let swept = {
            let _writes = self.write_gate.write().await;
            if let Some(prior) = &prior {
                prior.dispatcher().retire();
            }
            self.sweep(worker.stores()).await
        };

        let deleted = match swept {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(worker = worker.id, error = %e, "activation failed");
                if let Some(prior) = &prior {
                    prior.dispatcher().reinstate();
                }
                worker.set_state(WorkerState::Redundant).await;
                return Err(Error::ActivateFailed(e.to_string()));
            }
        };

        *self.active.write().await = Some(worker.clone());
        if let Some(prior) = prior {
            prior.set_state(WorkerState::Redundant).await;
        }
        worker.set_state(WorkerState::Active).await;

        let claimed = self.clients.claim(worker.version()).await;
        tracing::info!(worker = worker.id, swept = ?deleted, claimed, "activation complete");
        Ok(())
    }

    /// Delete every store outside `declared`. Returns the deleted names.
    async fn sweep(&self, declared: &StoreSet) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.db.store_names().await? {
            if declared.contains(&name) {
                continue;
            }
            if self.db.delete_store(&name).await? {
                tracing::info!(store = %name, "deleted superseded store");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Route an intercepted request through the active worker.
    ///
    /// With no active worker the request goes straight to the network.
    pub async fn handle_fetch(&self, request: &RequestDescriptor) -> Result<Served, Error> {
        match self.active().await {
            Some(worker) => worker.dispatcher().handle(request).await,
            None => {
                tracing::debug!(request = %request, "no active worker, passing through");
                let response = self.network.fetch(request).await?;
                Ok(Served {
                    response,
                    source: ResponseSource::Passthrough,
                    route: Route::Bypass(BypassReason::Uncontrolled),
                })
            }
        }
    }

    /// Track a client window, controlled by the active worker if there is one.
    pub async fn connect_client(&self, url: &Url) -> ClientInfo {
        let controller = self.active().await.map(|worker| worker.version().to_string());
        self.clients.connect(url, controller).await
    }

    pub async fn open_or_focus(&self, url: &Url) -> WindowAction {
        let controller = self.active().await.map(|worker| worker.version().to_string());
        self.clients.open_or_focus(url, controller).await
    }

    /// Entry count per live store.
    ///
    /// The active worker's declared stores are always listed, with zero when
    /// they do not currently exist.
    pub async fn cache_report(&self) -> Result<BTreeMap<String, u64>, Error> {
        let mut report = self.db.store_sizes().await?;
        if let Some(worker) = self.active().await {
            for name in worker.stores().names() {
                report.entry(name.to_string()).or_insert(0);
            }
        }
        Ok(report)
    }

    /// Delete every store regardless of version.
    pub async fn clear_all(&self) -> Result<u64, Error> {
        let deleted = self.db.delete_all_stores().await?;
        tracing::warn!(deleted, "cleared all stores");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ORIGIN, get, online, serving};
    use shellcache_client::fetch::testing::ScriptedNetwork;
    use shellcache_core::{RequestMode, ResponseArtifact};

    #[tokio::test]
    async fn test_first_register_activates() {
        let (registration, network) = online(&AppConfig::default()).await;

        let worker = registration.register(AppConfig::default()).await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Active);
        assert!(registration.waiting().await.is_none());

        let sizes = registration.db().store_sizes().await.unwrap();
        assert_eq!(sizes.get("ukrainian-winnipeg-static-v1"), Some(&15));
        assert_eq!(sizes.get("ukrainian-winnipeg-api-v1"), Some(&0));
        assert_eq!(network.calls(&format!("{ORIGIN}/static/js/app.js")), 1);
    }

    #[tokio::test]
    async fn test_install_failure_is_all_or_nothing() {
        let (registration, network) = online(&AppConfig::default()).await;
        network.respond(&format!("{ORIGIN}/heritage"), ResponseArtifact::new(503, "down"));

        let result = registration.register(AppConfig::default()).await;
        assert!(matches!(result, Err(Error::InstallFailed(_))));
        assert!(registration.active().await.is_none());

        assert!(registration.db().store_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_install_keeps_prior_worker() {
        let (registration, network) = online(&AppConfig::default()).await;
        let v1 = registration.register(AppConfig::default()).await.unwrap();

        network.set_offline(true);
        let v2 = AppConfig { version: "v2".into(), skip_waiting: true, ..Default::default() };
        assert!(registration.register(v2).await.is_err());

        let active = registration.active().await.unwrap();
        assert_eq!(active.id(), v1.id());
        assert_eq!(active.state().await, WorkerState::Active);
        assert!(registration.db().has_store("ukrainian-winnipeg-static-v1").await.unwrap());

        let names = registration.db().store_names().await.unwrap();
        assert!(names.iter().all(|name| !name.ends_with("-v2")), "{names:?}");
        let report = registration.cache_report().await.unwrap();
        assert!(report.keys().all(|name| !name.ends_with("-v2")), "{report:?}");
    }

    #[tokio::test]
    async fn test_second_worker_waits_until_activate_now() {
        let (registration, _network) = online(&AppConfig::default()).await;
        let v1 = registration.register(AppConfig::default()).await.unwrap();

        let v2 = registration.register(AppConfig { version: "v2".into(), ..Default::default() }).await.unwrap();
        assert_eq!(v2.state().await, WorkerState::Installed);
        assert_eq!(registration.active().await.unwrap().id(), v1.id());

        assert!(registration.activate_now().await.unwrap());
        assert_eq!(v2.state().await, WorkerState::Active);
        assert_eq!(v1.state().await, WorkerState::Redundant);
        assert!(v1.dispatcher().is_retired());

        assert!(!registration.activate_now().await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_deletes_exactly_superseded_store() {
        let (registration, _network) = online(&AppConfig::default()).await;
        registration.register(AppConfig::default()).await.unwrap();
        registration
            .db()
            .put("ukrainian-winnipeg-v1", &get("/events"), &ResponseArtifact::html("<p>events</p>"))
            .await
            .unwrap();

        let bumped = AppConfig { static_version: Some("v2".into()), skip_waiting: true, ..Default::default() };
        registration.register(bumped).await.unwrap();

        let mut names = registration.db().store_names().await.unwrap();
        names.sort();
        assert_eq!(
            names,
            vec!["ukrainian-winnipeg-api-v1", "ukrainian-winnipeg-static-v2", "ukrainian-winnipeg-v1"]
        );
        let general = registration.db().store_sizes().await.unwrap();
        assert_eq!(general.get("ukrainian-winnipeg-v1"), Some(&1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_writes_racing_activation_never_revive_swept_stores() {
        let (registration, network) = online(&AppConfig::default()).await;
        registration.register(AppConfig::default()).await.unwrap();
        for i in 0..32 {
            network.respond(&format!("{ORIGIN}/feed/{i}"), ResponseArtifact::new(200, format!("item {i}")));
        }
        registration.register(AppConfig { version: "v2".into(), ..Default::default() }).await.unwrap();

        let mut writers = JoinSet::new();
        for i in 0..32 {
            let registration = registration.clone();
            writers.spawn(async move { registration.handle_fetch(&get(&format!("/feed/{i}"))).await });
        }
        assert!(registration.activate_now().await.unwrap());
        while let Some(served) = writers.join_next().await {
            assert_eq!(served.unwrap().unwrap().response.status, 200);
        }

        let names = registration.db().store_names().await.unwrap();
        assert!(names.iter().all(|name| name.ends_with("-v2")), "{names:?}");
    }

    #[tokio::test]
    async fn test_admin_navigation_offline_gets_offline_page() {
        let (registration, network) = serving().await;
        network.set_offline(true);
        registration.clear_all().await.unwrap();

        let request = get("/admin").with_mode(RequestMode::Navigate).with_accept("text/html");
        let served = registration.handle_fetch(&request).await.unwrap();
        assert_eq!(served.response.status, 200);
        assert_eq!(served.source, ResponseSource::Synthetic);
    }

    #[tokio::test]
    async fn test_activation_claims_clients() {
        let (registration, _network) = online(&AppConfig::default()).await;
        let url = Url::parse(ORIGIN).unwrap();
        let before = registration.connect_client(&url).await;
        assert_eq!(before.controller, None);

        registration.register(AppConfig::default()).await.unwrap();

        let clients = registration.clients().list().await;
        assert_eq!(clients[0].controller.as_deref(), Some("v1"));

        let after = registration.connect_client(&url).await;
        assert_eq!(after.controller.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_handle_fetch_without_worker_passes_through() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond(&format!("{ORIGIN}/api/translations"), ResponseArtifact::new(200, "[]"));
        let db = CacheDb::open_in_memory().await.unwrap();
        let registration = Registration::new(db.clone(), network);

        let served = registration.handle_fetch(&get("/api/translations")).await.unwrap();
        assert_eq!(served.route, Route::Bypass(BypassReason::Uncontrolled));
        assert!(db.store_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_or_focus_reuses_window() {
        let clients = Clients::default();
        let root = Url::parse(ORIGIN).unwrap();
        let lessons = root.join("/lessons").unwrap();
        clients.connect(&lessons, None).await;

        let opened = clients.open_or_focus(&root, Some("v1".into())).await;
        let WindowAction::Opened(client) = opened else { panic!("expected a new window") };
        assert!(client.focused);

        let focused = clients.open_or_focus(&lessons, None).await;
        assert!(matches!(focused, WindowAction::Focused(ref c) if c.id == "client-1"));

        let windows = clients.list().await;
        assert_eq!(windows.iter().filter(|c| c.focused).count(), 1);
    }

    #[tokio::test]
    async fn test_cache_report_lists_declared_stores_after_clear() {
        let (registration, _network) = online(&AppConfig::default()).await;
        registration.register(AppConfig::default()).await.unwrap();

        registration.clear_all().await.unwrap();
        let report = registration.cache_report().await.unwrap();
        assert_eq!(report.len(), 3);
        assert!(report.values().all(|count| *count == 0));
    }
}

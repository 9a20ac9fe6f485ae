//! Deferred re-fetch obligations.
//!
//! An obligation says "when connectivity returns, re-fetch resource X and
//! re-cache it". Obligations live in the store database so they survive a
//! restart, and a restoration signal performs at most one fetch per pending tag.
//! Signals are handled one at a time, so signals arriving together still
//! produce a single fetch.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use shellcache_core::{AppConfig, Error, RequestDescriptor, ResponseArtifact};
use tokio::sync::Mutex;

use crate::lifecycle::Registration;

/// Result of one restoration signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SyncOutcome {
    /// Nothing was pending for the tag; no work done.
    NoObligation,
    /// Fetched, re-cached, obligation removed.
    Synced { resource: String, store: String },
    /// Fetch or re-cache failed; the obligation stays for the next signal.
    Failed { resource: String, error: String },
}

pub struct SyncAgent {
    registration: Arc<Registration>,
    config: AppConfig,
    restoring: Mutex<()>,
}

impl SyncAgent {
    pub fn new(registration: Arc<Registration>, config: AppConfig) -> Self {
        Self { registration, config, restoring: Mutex::new(()) }
    }

    /// Record an obligation for `tag`. Re-registering a pending tag is a no-op.
    ///
    /// Returns whether a new obligation was created.
    pub async fn register(&self, tag: &str) -> Result<bool, Error> {
        let resource = self
            .config
            .sync_resource(tag)
            .ok_or_else(|| Error::InvalidInput(format!("unknown sync tag: {tag}")))?;

        let created = self.registration.db().register_obligation(tag, resource).await?;
        tracing::info!(tag, resource, created, "sync obligation registered");
        Ok(created)
    }

    /// Handle a connectivity-restored signal for `tag`.
    pub async fn on_restored(&self, tag: &str) -> Result<SyncOutcome, Error> {
        let _restoring = self.restoring.lock().await;
        let db = self.registration.db();
        let Some(obligation) = db.get_obligation(tag).await? else {
            tracing::debug!(tag, "restoration signal with nothing pending");
            return Ok(SyncOutcome::NoObligation);
        };

        let url = self
            .config
            .resolve(&obligation.resource)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", obligation.resource)))?;
        let request = RequestDescriptor::get(url);

        match self.refresh(&request).await {
            Ok(store) => {
                db.discharge_obligation(tag).await?;
                tracing::info!(tag, resource = %obligation.resource, store, "sync obligation discharged");
                Ok(SyncOutcome::Synced { resource: obligation.resource, store })
            }
            Err(e) => {
                tracing::warn!(tag, resource = %obligation.resource, error = %e, "sync failed, obligation kept");
                db.record_obligation_failure(tag, &e.to_string()).await?;
                Ok(SyncOutcome::Failed { resource: obligation.resource, error: e.to_string() })
            }
        }
    }

    /// API store of the active worker, or of the configured store set when
    /// nothing is active yet.
    async fn api_store(&self) -> String {
        match self.registration.active().await {
            Some(worker) => worker.stores().api.clone(),
            None => self.config.store_set().api,
        }
    }

    /// Fetch and re-cache `request`. Returns the store written to.
    async fn refresh(&self, request: &RequestDescriptor) -> Result<String, Error> {
        let response = self.registration.network().fetch(request).await?;
        if !response.is_success() {
            return Err(Error::Network(format!("{request}: status {}", response.status)));
        }

        let data: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| Error::InvalidInput(format!("{request}: body is not JSON: {e}")))?;

        let _writing = self.registration.write_gate().read().await;
        let store = self.api_store().await;
        self.registration.db().put(&store, request, &ResponseArtifact::json(&data)).await?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ORIGIN, get, serving};
    use shellcache_core::TRANSLATIONS_SYNC_TAG;

    fn phrases() -> serde_json::Value {
        serde_json::json!([{"id": 7, "ukrainian": "Смачного", "english": "Enjoy your meal", "pronunciation": "Smach-no-ho", "category": "food"}])
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (registration, _network) = serving().await;
        let agent = SyncAgent::new(registration.clone(), AppConfig::default());

        assert!(agent.register(TRANSLATIONS_SYNC_TAG).await.unwrap());
        assert!(!agent.register(TRANSLATIONS_SYNC_TAG).await.unwrap());
        assert_eq!(registration.db().pending_obligations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tag_rejected() {
        let (registration, _network) = serving().await;
        let agent = SyncAgent::new(registration, AppConfig::default());

        assert!(matches!(agent.register("background-sync-lessons").await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_obligation_discharged_exactly_once() {
        let (registration, network) = serving().await;
        let agent = SyncAgent::new(registration.clone(), AppConfig::default());
        let url = format!("{ORIGIN}/api/translations");

        network.set_offline(true);
        agent.register(TRANSLATIONS_SYNC_TAG).await.unwrap();

        network.set_offline(false);
        network.respond(&url, ResponseArtifact::json(&phrases()));
        let before = network.calls(&url);

        let first = agent.on_restored(TRANSLATIONS_SYNC_TAG).await.unwrap();
        assert!(matches!(first, SyncOutcome::Synced { ref store, .. } if store == "ukrainian-winnipeg-api-v1"));
        assert_eq!(network.calls(&url), before + 1);

        let cached = registration
            .db()
            .match_in("ukrainian-winnipeg-api-v1", &get("/api/translations"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.response.content_type(), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&cached.response.body).unwrap();
        assert_eq!(body, phrases());

        let second = agent.on_restored(TRANSLATIONS_SYNC_TAG).await.unwrap();
        assert_eq!(second, SyncOutcome::NoObligation);
        assert_eq!(network.calls(&url), before + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_signals_fetch_once() {
        let (registration, network) = serving().await;
        let agent = Arc::new(SyncAgent::new(registration.clone(), AppConfig::default()));
        let url = format!("{ORIGIN}/api/translations");
        agent.register(TRANSLATIONS_SYNC_TAG).await.unwrap();
        network.respond(&url, ResponseArtifact::json(&phrases()));
        let before = network.calls(&url);

        let signals: Vec<_> = (0..2)
            .map(|_| {
                let agent = agent.clone();
                tokio::spawn(async move { agent.on_restored(TRANSLATIONS_SYNC_TAG).await })
            })
            .collect();
        let mut outcomes = Vec::new();
        for signal in signals {
            outcomes.push(signal.await.unwrap().unwrap());
        }

        assert_eq!(outcomes.iter().filter(|o| matches!(o, SyncOutcome::Synced { .. })).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == SyncOutcome::NoObligation).count(), 1);
        assert_eq!(network.calls(&url), before + 1);
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_obligation() {
        let (registration, network) = serving().await;
        let agent = SyncAgent::new(registration.clone(), AppConfig::default());
        agent.register(TRANSLATIONS_SYNC_TAG).await.unwrap();

        network.respond(&format!("{ORIGIN}/api/translations"), ResponseArtifact::new(200, "<html>oops</html>"));
        let outcome = agent.on_restored(TRANSLATIONS_SYNC_TAG).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Failed { .. }));

        let obligation = registration.db().get_obligation(TRANSLATIONS_SYNC_TAG).await.unwrap().unwrap();
        assert_eq!(obligation.attempts, 1);
        assert!(obligation.last_error.is_some());
        assert!(registration.db().match_any(&get("/api/translations")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_api_request_creates_obligation_then_sync_fills_store() {
        let (registration, network) = serving().await;
        let agent = SyncAgent::new(registration.clone(), AppConfig::default());

        network.set_offline(true);
        let served = registration.handle_fetch(&get("/api/translations")).await.unwrap();
        assert_eq!(served.response.status, 200);

        network.set_offline(false);
        network.respond(&format!("{ORIGIN}/api/translations"), ResponseArtifact::json(&phrases()));
        let outcome = agent.on_restored(TRANSLATIONS_SYNC_TAG).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Synced { .. }));

        network.set_offline(true);
        let offline = registration.handle_fetch(&get("/api/translations")).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&offline.response.body).unwrap();
        assert_eq!(body, phrases());
    }
}

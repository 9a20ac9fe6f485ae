//! Scripted in-memory network for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use shellcache_core::{Error, RequestDescriptor, ResponseArtifact};

use super::Network;

/// A [`Network`] that answers from a fixed route table.
///
/// Unknown URLs answer 404. While offline every fetch fails with
/// `Error::Network`. Calls are counted per URL, offline attempts included.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, ResponseArtifact>>,
    failing: Mutex<HashMap<String, String>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `response` until replaced.
    pub fn respond(&self, url: &str, response: ResponseArtifact) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    /// Make fetches of `url` fail with a transport error.
    pub fn fail(&self, url: &str, reason: &str) {
        self.failing.lock().unwrap().insert(url.to_string(), reason.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait::async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseArtifact, Error> {
        let url = request.url().to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{request}: offline")));
        }
        if let Some(reason) = self.failing.lock().unwrap().get(&url) {
            return Err(Error::Network(format!("{request}: {reason}")));
        }

        let response = self.routes.lock().unwrap().get(&url).cloned();
        Ok(response.unwrap_or_else(|| ResponseArtifact::new(404, "not found")))
    }
}

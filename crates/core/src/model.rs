//! Request/response data model shared by the dispatcher and the store registry.

use std::collections::BTreeMap;

use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::hash::compute_cache_key;

/// How the host issued a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    #[default]
    Other,
}

/// An intercepted outbound request.
///
/// Captured once and never mutated; used for classification and as the
/// store key (method + full URL including query).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: String,
    url: Url,
    accept: Option<String>,
    mode: RequestMode,
}

impl RequestDescriptor {
    pub fn new(method: &str, mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method: method.to_ascii_uppercase(), url, accept: None, mode: RequestMode::Other }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Store key: SHA-256 over method and URL.
    pub fn cache_key(&self) -> String {
        compute_cache_key(&self.method, self.url.as_str())
    }
}

impl std::fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A response as stored and returned by the layer.
///
/// The body is a cheaply clonable `Bytes`; persisting and returning the same
/// artifact always goes through an explicit `clone()` so the two consumers
/// never share one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseArtifact {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl ResponseArtifact {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, headers: BTreeMap::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// A 200 response carrying a JSON document.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string()).with_header("content-type", "application/json")
    }

    /// A 200 response carrying an HTML document.
    pub fn html(document: impl Into<String>) -> Self {
        let document: String = document.into();
        Self::new(200, document).with_header("content-type", "text/html; charset=utf-8")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// The three kinds of store a worker declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Application shell assets.
    Static,
    /// Dynamic data responses.
    Api,
    /// Navigations and everything else.
    General,
}

/// Versioned store names a worker considers current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSet {
    pub static_assets: String,
    pub api: String,
    pub general: String,
}

impl StoreSet {
    pub fn new(static_assets: impl Into<String>, api: impl Into<String>, general: impl Into<String>) -> Self {
        Self { static_assets: static_assets.into(), api: api.into(), general: general.into() }
    }

    pub fn name(&self, kind: StoreKind) -> &str {
        match kind {
            StoreKind::Static => &self.static_assets,
            StoreKind::Api => &self.api,
            StoreKind::General => &self.general,
        }
    }

    pub fn names(&self) -> [&str; 3] {
        [&self.static_assets, &self.api, &self.general]
    }

    /// Whether `name` is one of the declared stores; tags compare by exact equality.
    pub fn contains(&self, name: &str) -> bool {
        self.names().contains(&name)
    }
}

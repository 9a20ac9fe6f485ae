//! Request classification.
//!
//! Maps a request to the strategy that resolves it. Classification is pure:
//! no store or network access happens here.
//!
//! ### Order
//! 1. Hard exclusions: non-GET, non-http(s) → bypass
//! 2. [`RULES`], evaluated top to bottom, first match wins
//! 3. Anything left → [`Strategy::Generic`]
//!
//! The prefix and suffix tables live in [`RouteTable`] so new asset types or API
//! prefixes are configuration, not new branches.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{AppConfig, RequestDescriptor, RequestMode};

/// How a handled request is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Static store first; on miss fetch and re-cache. Fetch failure propagates.
    CacheFirst,
    /// Network first; API store on failure; seed dataset for the primary endpoint.
    NetworkFirst,
    /// Network first; any store, then the app root, then the offline page.
    Navigation,
    /// Any store first; on miss fetch and re-cache successes.
    Generic,
}

/// Why a request skipped the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BypassReason {
    NonGet,
    NonHttp,
    /// No worker is active. Set by the lifecycle layer, never by [`RouteTable::classify`].
    Uncontrolled,
}

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Bypass(BypassReason),
    Handle(Strategy),
}

/// Prefix/suffix tables the rules consult.
#[derive(Debug, Clone)]
pub struct RouteTable {
    origin_host: Option<String>,
    api_prefixes: Vec<String>,
    static_suffixes: Vec<String>,
    static_prefixes: Vec<String>,
}

/// One classification predicate.
pub struct Rule {
    pub name: &'static str,
    pub strategy: Strategy,
    matches: fn(&RouteTable, &RequestDescriptor) -> bool,
}

/// Ordered classification table.
pub const RULES: &[Rule] = &[
    Rule { name: "api", strategy: Strategy::NetworkFirst, matches: RouteTable::is_api },
    Rule { name: "static", strategy: Strategy::CacheFirst, matches: RouteTable::is_static },
    Rule { name: "navigation", strategy: Strategy::Navigation, matches: RouteTable::is_navigation },
];

impl RouteTable {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            origin_host: config.origin.host_str().map(str::to_string),
            api_prefixes: config.api_prefixes.clone(),
            static_suffixes: config.static_suffixes.iter().map(|s| s.to_lowercase()).collect(),
            static_prefixes: config.static_prefixes.clone(),
        }
    }

    /// Classify a request.
    pub fn classify(&self, request: &RequestDescriptor) -> Route {
        if !request.is_get() {
            return Route::Bypass(BypassReason::NonGet);
        }
        if !request.is_http() {
            return Route::Bypass(BypassReason::NonHttp);
        }

        let strategy = RULES
            .iter()
            .find(|rule| (rule.matches)(self, request))
            .map(|rule| rule.strategy)
            .unwrap_or(Strategy::Generic);

        Route::Handle(strategy)
    }

    fn is_same_origin(&self, request: &RequestDescriptor) -> bool {
        request.url().host_str() == self.origin_host.as_deref()
    }

    fn is_api(&self, request: &RequestDescriptor) -> bool {
        starts_with_any(request.url().path(), &self.api_prefixes)
    }

    fn is_static(&self, request: &RequestDescriptor) -> bool {
        let path = request.url().path().to_lowercase();
        self.static_suffixes.iter().any(|suffix| path.ends_with(suffix.as_str()))
            || starts_with_any(&path, &self.static_prefixes)
            || !self.is_same_origin(request)
    }

    fn is_navigation(&self, request: &RequestDescriptor) -> bool {
        request.is_get()
            && (request.mode() == RequestMode::Navigate
                || request.accept().is_some_and(|accept| accept.contains("text/html")))
    }
}

fn starts_with_any(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

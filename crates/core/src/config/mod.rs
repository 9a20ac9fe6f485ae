//! Application configuration with layered loading.
//!
//! Configuration is loaded with figment from, lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
//! 3. Environment variables (SHELLCACHE_*, `__` separates nested keys)
//!
//! Everything a worker needs (declared stores, asset manifest, classification
//! tables, sync resources) lives here and is handed to the worker at
//! construction.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::StoreSet;

mod validation;

pub use validation::ConfigError;

/// Tag the host uses for re-fetching the phrase dataset.
pub const TRANSLATIONS_SYNC_TAG: &str = "background-sync-translations";

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the host application. Requests to any other host count as
    /// third-party and are served cache-first.
    #[serde(default = "default_origin")]
    pub origin: Url,

    /// Prefix shared by every store name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version tag appended to store names. Any change triggers a sweep.
    #[serde(default = "default_version")]
    pub version: String,

    /// Per-store version overrides.
    #[serde(default)]
    pub static_version: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub general_version: Option<String>,

    /// Application-shell manifest pre-warmed into the static store on install.
    /// Relative entries resolve against `origin`.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    #[serde(default = "default_api_prefixes")]
    pub api_prefixes: Vec<String>,

    /// Lower-case path suffixes treated as static assets.
    #[serde(default = "default_static_suffixes")]
    pub static_suffixes: Vec<String>,

    #[serde(default = "default_static_prefixes")]
    pub static_prefixes: Vec<String>,

    /// Data endpoint that falls back to the built-in seed dataset.
    #[serde(default = "default_primary_endpoint")]
    pub primary_endpoint: String,

    /// Sync tag to resource path.
    #[serde(default = "default_sync_resources")]
    pub sync_resources: BTreeMap<String, String>,

    /// User-Agent string for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Activate as soon as install finishes instead of waiting for an
    /// explicit activate-now.
    #[serde(default)]
    pub skip_waiting: bool,

    /// Default notification title.
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shellcache.sqlite")
}

fn default_origin() -> Url {
    Url::parse("http://localhost:5000/").expect("static default origin is a valid URL")
}

fn default_cache_prefix() -> String {
    "ukrainian-winnipeg".into()
}

fn default_version() -> String {
    "v1".into()
}

fn default_precache() -> Vec<String> {
    [
        "/",
        "/static/css/styles.css",
        "/static/js/app.js",
        "/static/js/translator.js",
        "/static/js/lessons.js",
        "/static/manifest.json",
        "/translator",
        "/lessons",
        "/community",
        "/heritage",
        "/events",
        "/resources",
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js",
        "https://unpkg.com/feather-icons",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_api_prefixes() -> Vec<String> {
    vec!["/api/".into()]
}

fn default_static_suffixes() -> Vec<String> {
    [".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_static_prefixes() -> Vec<String> {
    vec!["/static/".into()]
}

fn default_primary_endpoint() -> String {
    "/api/translations".into()
}

fn default_sync_resources() -> BTreeMap<String, String> {
    BTreeMap::from([(TRANSLATIONS_SYNC_TAG.to_string(), "/api/translations".to_string())])
}

fn default_user_agent() -> String {
    "shellcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_app_name() -> String {
    "Ukrainian Winnipeg".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            static_version: None,
            api_version: None,
            general_version: None,
            precache: default_precache(),
            api_prefixes: default_api_prefixes(),
            static_suffixes: default_static_suffixes(),
            static_prefixes: default_static_prefixes(),
            primary_endpoint: default_primary_endpoint(),
            sync_resources: default_sync_resources(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            skip_waiting: false,
            app_name: default_app_name(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The three store names this configuration declares current.
    pub fn store_set(&self) -> StoreSet {
        let version_of = |over: &Option<String>| over.clone().unwrap_or_else(|| self.version.clone());
        StoreSet::new(
            format!("{}-static-{}", self.cache_prefix, version_of(&self.static_version)),
            format!("{}-api-{}", self.cache_prefix, version_of(&self.api_version)),
            format!("{}-{}", self.cache_prefix, version_of(&self.general_version)),
        )
    }

    /// Resolve a path or absolute URL against the application origin.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, url::ParseError> {
        self.origin.join(path_or_url)
    }

    /// Resource path registered for a sync tag.
    pub fn sync_resource(&self, tag: &str) -> Option<&str> {
        self.sync_resources.get(tag).map(String::as_str)
    }

    /// Sync tag whose resource is `path`, if any.
    pub fn sync_tag_for(&self, path: &str) -> Option<&str> {
        self.sync_resources
            .iter()
            .find(|(_, resource)| resource.as_str() == path)
            .map(|(tag, _)| tag.as_str())
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHELLCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELLCACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

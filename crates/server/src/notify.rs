//! Push payloads to notification descriptors, and clicks back to windows.

use std::collections::BTreeMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::lifecycle::{Registration, WindowAction};

const DEFAULT_BODY: &str = "New update available!";
const DEFAULT_TAG: &str = "default";
const DEFAULT_ICON: &str = "/static/manifest.json";

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    fn new(action: &str, title: &str) -> Self {
        Self { action: action.into(), title: title.into() }
    }
}

/// Fields a push payload may carry. All optional.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    tag: Option<String>,
    actions: Option<Vec<NotificationAction>>,
}

impl PushPayload {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.tag.is_none() && self.actions.is_none()
    }
}

/// What gets shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct NotificationDescriptor {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub icon: String,
    pub badge: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
}

/// Result of a notification click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ClickOutcome {
    /// An existing window already showed the app root and was focused.
    Focused { client_id: String },
    /// A new window was opened on the app root.
    Opened { url: String },
    /// Closed without opening anything.
    Dismissed,
    /// No notification with that tag is displayed.
    NotFound,
}

pub struct NotificationDispatcher {
    app_name: String,
    app_root: Url,
    registration: Arc<Registration>,
    displayed: RwLock<BTreeMap<String, NotificationDescriptor>>,
}

impl NotificationDispatcher {
    pub fn new(app_name: impl Into<String>, app_root: Url, registration: Arc<Registration>) -> Self {
        Self { app_name: app_name.into(), app_root, registration, displayed: RwLock::new(BTreeMap::new()) }
    }

    /// Turn a push payload into a displayed notification.
    ///
    /// A missing, malformed or empty payload shows nothing and is not an error.
    /// A new notification with the tag of a displayed one replaces it.
    pub async fn push(&self, payload: Option<&[u8]>) -> Option<NotificationDescriptor> {
        let Some(bytes) = payload else {
            tracing::debug!("push without payload ignored");
            return None;
        };

        let payload = match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(value @ serde_json::Value::Object(_)) => match serde_json::from_value::<PushPayload>(value) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::debug!(error = %e, "push payload has unexpected field types, ignored");
                    return None;
                }
            },
            Ok(_) => {
                tracing::debug!("push payload is not a JSON object, ignored");
                return None;
            }
            Err(e) => {
                tracing::debug!(error = %e, "push payload is not JSON, ignored");
                return None;
            }
        };

        if payload.is_empty() {
            tracing::debug!("empty push payload ignored");
            return None;
        }

        let descriptor = NotificationDescriptor {
            title: payload.title.unwrap_or_else(|| self.app_name.clone()),
            body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            tag: payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_ICON.to_string(),
            require_interaction: false,
            actions: payload
                .actions
                .unwrap_or_else(|| vec![NotificationAction::new("view", "View"), NotificationAction::new("dismiss", "Dismiss")]),
        };

        tracing::info!(tag = %descriptor.tag, title = %descriptor.title, "showing notification");
        self.displayed.write().await.insert(descriptor.tag.clone(), descriptor.clone());
        Some(descriptor)
    }

    /// Handle a click on the notification tagged `tag`.
    ///
    /// The notification closes. `view` or a click on the body brings the app
    /// root into view; any other action only closes it.
    pub async fn click(&self, tag: &str, action: Option<&str>) -> ClickOutcome {
        if self.displayed.write().await.remove(tag).is_none() {
            tracing::debug!(tag, "click on unknown notification");
            return ClickOutcome::NotFound;
        }

        match action {
            None | Some("view") => match self.registration.open_or_focus(&self.app_root).await {
                WindowAction::Focused(client) => ClickOutcome::Focused { client_id: client.id },
                WindowAction::Opened(client) => ClickOutcome::Opened { url: client.url },
            },
            Some(other) => {
                tracing::debug!(tag, action = other, "notification dismissed");
                ClickOutcome::Dismissed
            }
        }
    }

    pub async fn displayed(&self) -> Vec<NotificationDescriptor> {
        self.displayed.read().await.values().cloned().collect()
    }
}

//! Request/response control endpoint, separate from request interception.
//!
//! [`ControlChannel::spawn`] starts a task that receives messages paired with a
//! `oneshot` reply sender, so every caller gets its own answer. Each message is
//! handled on its own task; a slow clear never blocks a report.

use std::collections::BTreeMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::Error;
use tokio::sync::{mpsc, oneshot};

use crate::error::ServerError;
use crate::lifecycle::Registration;

/// Operations the control endpoint understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ControlAction {
    #[serde(alias = "skipWaiting")]
    ActivateNow,
    #[serde(alias = "clearCache")]
    ClearAllCaches,
    #[serde(alias = "getCacheInfo")]
    ReportCacheContents,
}

impl ControlAction {
    pub fn parse(action: &str) -> Result<Self, Error> {
        serde_json::from_value(serde_json::Value::String(action.to_string()))
            .map_err(|_| Error::UnknownAction(action.to_string()))
    }
}

/// A control message as sent by the host: `{"action": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ControlMessage {
    pub action: String,
}

impl ControlMessage {
    pub fn new(action: impl Into<String>) -> Self {
        Self { action: action.into() }
    }
}

/// Reply shapes, serialized without a wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ControlReply {
    Failed {
        success: bool,
        error: String,
    },
    Done {
        success: bool,
    },
    CacheInfo {
        #[serde(rename = "cacheInfo")]
        cache_info: BTreeMap<String, u64>,
    },
}

impl ControlReply {
    fn done() -> Self {
        Self::Done { success: true }
    }

    fn failed(error: impl ToString) -> Self {
        Self::Failed { success: false, error: error.to_string() }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::Done { success } => *success,
            Self::CacheInfo { .. } => true,
            Self::Failed { .. } => false,
        }
    }
}

type Envelope = (ControlMessage, oneshot::Sender<ControlReply>);

/// Cloneable sender side of the control endpoint.
#[derive(Clone)]
pub struct ControlHandle {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl ControlHandle {
    /// Send one message and wait for its reply.
    pub async fn send(&self, message: ControlMessage) -> Result<ControlReply, ServerError> {
        let action = message.action.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender.send((message, reply_tx)).map_err(|_| ServerError::ControlClosed)?;
        reply_rx.await.map_err(|_| ServerError::ReplyLost(action))
    }
}

pub struct ControlChannel;

impl ControlChannel {
    /// Start serving control messages against `registration`.
    pub fn spawn(registration: Arc<Registration>) -> ControlHandle {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope>();

        tokio::spawn(async move {
            while let Some((message, reply)) = receiver.recv().await {
                let registration = registration.clone();
                tokio::spawn(async move {
                    let answer = handle(&registration, &message).await;
                    if reply.send(answer).is_err() {
                        tracing::debug!(action = %message.action, "control caller went away before reply");
                    }
                });
            }
            tracing::debug!("control channel closed");
        });

        ControlHandle { sender }
    }
}

async fn handle(registration: &Registration, message: &ControlMessage) -> ControlReply {
    let action = match ControlAction::parse(&message.action) {
        Ok(action) => action,
        Err(_) => {
            tracing::warn!(action = %message.action, "unrecognized control action");
            return ControlReply::failed(format!("unrecognized action: {}", message.action));
        }
    };

    tracing::info!(?action, "control message");

    let result = match action {
        ControlAction::ActivateNow => registration.activate_now().await.map(|_| ControlReply::done()),
        ControlAction::ClearAllCaches => registration.clear_all().await.map(|_| ControlReply::done()),
        ControlAction::ReportCacheContents => registration
            .cache_report()
            .await
            .map(|cache_info| ControlReply::CacheInfo { cache_info }),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(?action, error = %e, "control action failed");
        ControlReply::failed(e)
    })
}

//! Push delivery to a single device.
//!
//! `PushDispatcher` turns text into a provider message and hands it to a
//! `PushChannel`. Every failure stops here: the dispatcher answers `true`
//! or `false`, so one bad device never aborts a fan-out.
//!
//! - `fcm`: Firebase Cloud Messaging HTTP v1 channel

pub mod fcm;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PushConfig;
use crate::registry::mask_token;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push provider rejected the message (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("push token is no longer registered")]
    Unregistered,
}

/// Delivery priority hint. Relay traffic is always `High` so idle devices
/// still wake for the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
}

/// The visible/audible part of a message. Absent on silent sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleNotification {
    pub title: String,
    pub body: String,
    pub channel_id: String,
    pub sound: String,
}

/// Provider-neutral message for one device.
#[derive(Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub token: String,
    pub data: BTreeMap<String, String>,
    pub priority: Priority,
    pub notification: Option<VisibleNotification>,
}

impl PushMessage {
    pub fn is_silent(&self) -> bool {
        self.notification.is_none()
    }
}

impl std::fmt::Debug for PushMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushMessage")
            .field("token", &mask_token(&self.token))
            .field("data", &self.data)
            .field("priority", &self.priority)
            .field("notification", &self.notification)
            .finish()
    }
}

/// External push service. Returns the provider's message id on success.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError>;
}

pub struct PushDispatcher {
    channel: Option<Arc<dyn PushChannel>>,
    title: String,
    channel_id: String,
}

impl PushDispatcher {
    pub fn new(channel: Option<Arc<dyn PushChannel>>, config: &PushConfig) -> Self {
        if channel.is_none() {
            warn!("No push channel configured, running in no-push mode");
        }
        Self {
            channel,
            title: config.notification_title.clone(),
            channel_id: config.channel_id.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.channel.is_some()
    }

    /// Build the outgoing message for one device.
    pub fn build_message(
        &self,
        push_token: &str,
        text: &str,
        message_type: &str,
        silent: bool,
    ) -> PushMessage {
        let mut data = BTreeMap::new();
        data.insert("message".to_string(), text.to_string());
        data.insert("type".to_string(), message_type.to_string());
        data.insert("timestamp".to_string(), chrono::Utc::now().timestamp().to_string());
        data.insert("silent".to_string(), silent.to_string());

        let notification = (!silent).then(|| VisibleNotification {
            title: self.title.clone(),
            body: text.to_string(),
            channel_id: self.channel_id.clone(),
            sound: "default".to_string(),
        });

        PushMessage {
            token: push_token.to_string(),
            data,
            priority: Priority::High,
            notification,
        }
    }

    /// Send `text` to one device. `false` on any failure, including a
    /// missing channel (no network I/O is attempted then).
    pub async fn send(
        &self,
        push_token: &str,
        text: &str,
        message_type: &str,
        silent: bool,
    ) -> bool {
        let Some(channel) = &self.channel else {
            debug!("Push channel not configured, dropping message for {}", mask_token(push_token));
            return false;
        };

        let message = self.build_message(push_token, text, message_type, silent);
        match channel.send(&message).await {
            Ok(id) => {
                info!(
                    "Sent {}{message_type} message to {} ({id})",
                    if message.is_silent() { "silent " } else { "" },
                    mask_token(push_token)
                );
                true
            }
            Err(e) => {
                warn!("Failed to send message to {}: {e}", mask_token(push_token));
                false
            }
        }
    }
}

//! Firebase Cloud Messaging HTTP v1 channel.
//!
//! Posts one message per call to
//! `{endpoint}/v1/projects/{project_id}/messages:send` with a bearer access
//! token. Token minting (service-account OAuth) happens outside the relay;
//! the token comes from config or `FCM_ACCESS_TOKEN`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PushChannel, PushError, PushMessage, Priority};
use crate::config::PushConfig;

#[derive(Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    data: &'a std::collections::BTreeMap<String, String>,
    android: AndroidConfig<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<FcmNotification<'a>>,
}

#[derive(Serialize)]
struct AndroidConfig<'a> {
    priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<AndroidNotification<'a>>,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct AndroidNotification<'a> {
    channel_id: &'a str,
    sound: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

pub struct FcmChannel {
    client: Client,
    url: String,
    access_token: String,
}

impl FcmChannel {
    pub fn new(
        endpoint: &str,
        project_id: &str,
        access_token: String,
        timeout: Duration,
    ) -> Result<Self, PushError> {
        let client = Client::builder().timeout(timeout).build()?;
        let url = format!(
            "{}/v1/projects/{project_id}/messages:send",
            endpoint.trim_end_matches('/')
        );
        Ok(Self {
            client,
            url,
            access_token,
        })
    }

    /// Build a channel from config. `Ok(None)` when push is disabled or the
    /// project id / access token is missing.
    pub fn from_config(config: &PushConfig) -> Result<Option<Self>, PushError> {
        if !config.enabled {
            info!("Push delivery disabled in config");
            return Ok(None);
        }
        if config.project_id.trim().is_empty() {
            info!("push.project_id not set, push delivery unavailable");
            return Ok(None);
        }
        let Some(token) = config.resolved_access_token() else {
            info!("No FCM access token available, push delivery unavailable");
            return Ok(None);
        };

        let channel = Self::new(
            &config.endpoint,
            config.project_id.trim(),
            token,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!("FCM channel ready for project {}", config.project_id.trim());
        Ok(Some(channel))
    }

    fn request_body<'a>(message: &'a PushMessage) -> SendRequest<'a> {
        let visible = message.notification.as_ref();
        SendRequest {
            message: FcmMessage {
                token: &message.token,
                data: &message.data,
                android: AndroidConfig {
                    priority: message.priority,
                    notification: visible.map(|n| AndroidNotification {
                        channel_id: &n.channel_id,
                        sound: &n.sound,
                    }),
                },
                notification: visible.map(|n| FcmNotification {
                    title: &n.title,
                    body: &n.body,
                }),
            },
        }
    }
}

#[async_trait]
impl PushChannel for FcmChannel {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&Self::request_body(message))
            .send()
            .await?;

        let status = response.status().as_u16();
        match status {
            200..=299 => {
                let body: SendResponse = response.json().await?;
                debug!("FCM accepted message {}", body.name);
                Ok(body.name)
            }
            404 => Err(PushError::Unregistered),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(PushError::Rejected { status, body })
            }
        }
    }
}

//! HTTP API for the relay.
//!
//! Handlers deserialize a typed request, call one `Relay` method and map the
//! outcome to JSON. Missing required fields are rejected by the `Json`
//! extractor before a handler runs.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::{Classification, Notification};
use crate::fanout::FanOutOutcome;
use crate::history::ConversationRecord;
use crate::registry::DeviceMetadata;
use crate::relay::{ChatOutcome, RegisterOutcome, Relay, SendOutcome};

pub type ApiState = Arc<Relay>;

// --- Request/Response types ---

#[derive(Deserialize)]
struct NotifyRequest {
    #[serde(flatten)]
    notification: Notification,
    device_id: Option<String>,
    #[serde(default)]
    silent: bool,
}

#[derive(Serialize, Deserialize)]
pub struct NotifyResponse {
    pub result: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_to_devices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_error: Option<String>,
}

#[derive(Deserialize)]
struct RegisterDeviceRequest {
    device_id: String,
    #[serde(alias = "fcm_token")]
    push_token: String,
    device_type: Option<String>,
    app_version: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct RegisterDeviceResponse {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_count: Option<usize>,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    message: String,
    device_id: String,
    #[serde(rename = "type")]
    message_type: Option<String>,
    #[serde(default)]
    silent: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SendMessageResponse {
    Done {
        result: String,
        message: String,
        device_id: String,
    },
    Error {
        error: String,
    },
}

#[derive(Deserialize)]
struct BroadcastRequest {
    message: String,
    #[serde(rename = "type")]
    message_type: Option<String>,
    #[serde(default)]
    silent: bool,
}

#[derive(Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub status: String,
    pub successful_devices: Vec<String>,
    pub failed_devices: Vec<String>,
    pub total_devices: usize,
    pub successful_count: usize,
    pub failed_count: usize,
}

#[derive(Deserialize)]
struct ChatRequest {
    text: String,
    device_id: Option<String>,
    #[serde(default)]
    spoken: bool,
    #[serde(default)]
    silent: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Replied {
        user: String,
        ai: String,
        spoken: bool,
        pushed_to_devices: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        push_error: Option<String>,
    },
    Failed {
        user: String,
        error: String,
    },
}

#[derive(Serialize, Deserialize)]
pub struct DeviceView {
    pub device_type: String,
    pub app_version: String,
    pub registered_at: String,
    pub push_token: String,
}

#[derive(Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: IndexMap<String, DeviceView>,
    pub count: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    pub push_channel_configured: bool,
    pub registered_devices_count: usize,
    pub can_send_notifications: bool,
    pub ai_enabled: bool,
    pub filter_enabled: bool,
}

#[derive(Deserialize)]
struct ConversationsQuery {
    date: Option<String>,
}

#[derive(Serialize)]
pub struct ConversationsResponse {
    pub date: String,
    pub records: Vec<ConversationRecord>,
}

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/notify", post(handle_notify))
        .route("/register_device", post(handle_register_device))
        .route("/send_message", post(handle_send_message))
        .route("/broadcast_message", post(handle_broadcast))
        .route("/chat", post(handle_chat))
        .route("/devices", get(handle_devices))
        .route("/status", get(handle_status))
        .route("/conversations", get(handle_conversations))
        .with_state(state)
}

/// Bind `host:port` and serve until the process exits.
pub async fn serve(state: ApiState, host: &str, port: u16) -> std::io::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Relay API listening on {addr}");
    axum::serve(listener, router(state)).await
}

fn device_not_found(device_id: &str) -> String {
    format!("No registered device found for {device_id}")
}

/// Why nothing could be attempted, for fan-outs that never reached a device.
fn push_error(delivery: &FanOutOutcome) -> Option<String> {
    match delivery {
        FanOutOutcome::DeviceNotFound(id) => Some(device_not_found(id)),
        FanOutOutcome::NoDevices => Some("No registered devices".to_string()),
        FanOutOutcome::Completed(_) => None,
    }
}

// --- Handlers ---

async fn handle_notify(
    State(relay): State<ApiState>,
    Json(req): Json<NotifyRequest>,
) -> Json<NotifyResponse> {
    let preview: String = req.notification.text.chars().take(60).collect();
    info!("HTTP /notify [{}]: \"{}\"", req.notification.app, preview.replace('\n', " "));

    let outcome = relay
        .handle_notification(&req.notification, req.device_id.as_deref(), req.silent)
        .await;

    let output = match &outcome.classification {
        Classification::Accepted(text) => text.clone(),
        Classification::FilteredOut => {
            format!("Notification from {} was filtered out", req.notification.app)
        }
        Classification::SpamFiltered => "Notification looks like spam".to_string(),
    };

    let delivery = outcome.delivery.as_ref();
    Json(NotifyResponse {
        result: outcome.classification.label().to_string(),
        output,
        pushed_to_devices: delivery.map(FanOutOutcome::delivered_to),
        push_error: delivery.and_then(push_error),
    })
}

async fn handle_register_device(
    State(relay): State<ApiState>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Json<RegisterDeviceResponse> {
    let defaults = DeviceMetadata::default();
    let metadata = DeviceMetadata {
        device_type: req.device_type.unwrap_or(defaults.device_type),
        app_version: req.app_version.unwrap_or(defaults.app_version),
    };

    let response = match relay
        .register_device(&req.device_id, &req.push_token, metadata)
        .await
    {
        RegisterOutcome::Registered { record, welcomed } => RegisterDeviceResponse {
            status: "success".into(),
            message: if welcomed {
                "Device registered successfully, welcome message sent".into()
            } else {
                "Device registered successfully".into()
            },
            device_id: Some(record.device_id),
            device_count: Some(relay.registry().len()),
        },
        RegisterOutcome::Invalid(reason) => RegisterDeviceResponse {
            status: "error".into(),
            message: reason.into(),
            device_id: (!req.device_id.trim().is_empty()).then(|| req.device_id.trim().to_string()),
            device_count: None,
        },
    };
    Json(response)
}

async fn handle_send_message(
    State(relay): State<ApiState>,
    Json(req): Json<SendMessageRequest>,
) -> Json<SendMessageResponse> {
    let outcome = relay
        .send_message(&req.device_id, &req.message, req.message_type.as_deref(), req.silent)
        .await;

    let response = match outcome {
        SendOutcome::DeviceNotFound(id) => SendMessageResponse::Error {
            error: device_not_found(&id),
        },
        SendOutcome::Sent(success) => {
            let silent = if req.silent { " (silent)" } else { "" };
            SendMessageResponse::Done {
                result: if success { "success" } else { "failed" }.into(),
                message: if success {
                    format!("Message sent successfully{silent}")
                } else {
                    format!("Failed to send message{silent}")
                },
                device_id: req.device_id.trim().to_string(),
            }
        }
    };
    Json(response)
}

async fn handle_broadcast(
    State(relay): State<ApiState>,
    Json(req): Json<BroadcastRequest>,
) -> Json<BroadcastResponse> {
    let response = match relay
        .broadcast(&req.message, req.message_type.as_deref(), req.silent)
        .await
    {
        Some(report) => BroadcastResponse {
            status: "completed".into(),
            successful_devices: report.successful(),
            failed_devices: report.failed(),
            total_devices: report.total(),
            successful_count: report.successful_count(),
            failed_count: report.failed_count(),
        },
        None => BroadcastResponse {
            status: "no_devices".into(),
            successful_devices: Vec::new(),
            failed_devices: Vec::new(),
            total_devices: 0,
            successful_count: 0,
            failed_count: 0,
        },
    };
    Json(response)
}

async fn handle_chat(
    State(relay): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let response = match relay
        .chat(&req.text, req.device_id.as_deref(), req.spoken, req.silent)
        .await
    {
        ChatOutcome::Replied {
            reply,
            spoken,
            delivery,
        } => ChatResponse::Replied {
            user: req.text,
            ai: reply,
            spoken,
            pushed_to_devices: delivery.delivered_to(),
            push_error: push_error(&delivery),
        },
        ChatOutcome::Failed(error) => ChatResponse::Failed {
            user: req.text,
            error,
        },
    };
    Json(response)
}

async fn handle_devices(State(relay): State<ApiState>) -> Json<DevicesResponse> {
    let devices: IndexMap<String, DeviceView> = relay
        .devices()
        .into_iter()
        .map(|record| {
            let view = DeviceView {
                push_token: record.masked_token(),
                device_type: record.metadata.device_type,
                app_version: record.metadata.app_version,
                registered_at: record.registered_at.to_rfc3339(),
            };
            (record.device_id, view)
        })
        .collect();

    Json(DevicesResponse {
        count: devices.len(),
        devices,
    })
}

async fn handle_status(State(relay): State<ApiState>) -> Json<StatusResponse> {
    let status = relay.status();
    Json(StatusResponse {
        push_channel_configured: status.push_channel_configured,
        registered_devices_count: status.registered_devices,
        can_send_notifications: status.can_send_notifications(),
        ai_enabled: status.ai_enabled,
        filter_enabled: status.filter_enabled,
    })
}

async fn handle_conversations(
    State(relay): State<ApiState>,
    Query(query): Query<ConversationsQuery>,
) -> Json<ConversationsResponse> {
    let (date, records) = relay.conversations(query.date.as_deref().unwrap_or("today"));
    Json(ConversationsResponse { date, records })
}

//! Fan-out of one message to one or all registered devices.
//!
//! Targets are resolved against the registry, sends run concurrently, and
//! the per-device results are joined into a single report. Counts are
//! always derived from the per-device list.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::push::PushDispatcher;
use crate::registry::{DeviceRecord, DeviceRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Device(String),
    All,
}

impl Target {
    /// `Device` for a non-blank id, otherwise `All`.
    pub fn from_optional(device_id: Option<&str>) -> Self {
        match device_id.map(str::trim) {
            Some(id) if !id.is_empty() => Self::Device(id.to_string()),
            _ => Self::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResult {
    pub device_id: String,
    pub success: bool,
}

/// Per-device results of one fan-out, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub results: Vec<DeviceResult>,
}

impl DeliveryReport {
    pub fn successful(&self) -> Vec<String> {
        self.ids_where(true)
    }

    pub fn failed(&self) -> Vec<String> {
        self.ids_where(false)
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn get(&self, device_id: &str) -> Option<bool> {
        self.results
            .iter()
            .find(|r| r.device_id == device_id)
            .map(|r| r.success)
    }

    fn ids_where(&self, success: bool) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.success == success)
            .map(|r| r.device_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanOutOutcome {
    /// Broadcast with nothing registered.
    NoDevices,
    /// Single target that is not registered. No send was attempted.
    DeviceNotFound(String),
    /// Sends attempted; individual devices may still have failed.
    Completed(DeliveryReport),
}

impl FanOutOutcome {
    /// Devices that received the message.
    pub fn delivered_to(&self) -> Vec<String> {
        match self {
            Self::Completed(report) => report.successful(),
            _ => Vec::new(),
        }
    }
}

pub struct FanOut {
    registry: DeviceRegistry,
    dispatcher: Arc<PushDispatcher>,
}

impl FanOut {
    pub fn new(registry: DeviceRegistry, dispatcher: Arc<PushDispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &PushDispatcher {
        &self.dispatcher
    }

    pub async fn dispatch(
        &self,
        text: &str,
        target: &Target,
        message_type: &str,
        silent: bool,
    ) -> FanOutOutcome {
        let devices = match target {
            Target::Device(id) => match self.registry.resolve(id) {
                Some(device) => vec![device],
                None => {
                    warn!("Device {id} not found in registered devices");
                    return FanOutOutcome::DeviceNotFound(id.clone());
                }
            },
            // Devices are never removed, so a non-empty check holds for the snapshot.
            Target::All if self.registry.is_empty() => {
                warn!("No registered devices found");
                return FanOutOutcome::NoDevices;
            }
            Target::All => self.registry.all(),
        };

        let sends = devices
            .iter()
            .map(|device| self.send_one(device, text, message_type, silent));
        let results = join_all(sends).await;

        let report = DeliveryReport { results };
        info!(
            "Fan-out complete: {} successful, {} failed, {} total",
            report.successful_count(),
            report.failed_count(),
            report.total()
        );
        FanOutOutcome::Completed(report)
    }

    async fn send_one(
        &self,
        device: &DeviceRecord,
        text: &str,
        message_type: &str,
        silent: bool,
    ) -> DeviceResult {
        let success = if device.has_token() {
            self.dispatcher
                .send(&device.push_token, text, message_type, silent)
                .await
        } else {
            warn!("No push token for device {}", device.device_id);
            false
        };
        DeviceResult {
            device_id: device.device_id.clone(),
            success,
        }
    }
}

//! In-memory device registry: device id → push token and metadata.
//!
//! The registry is the source of truth for fan-out targets. It lives for
//! the lifetime of the process; nothing is persisted. Handles are cheap to
//! clone and share one map behind a reader/writer lock.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::info;

/// Characters of a push token that may appear outside the registry.
const TOKEN_PREVIEW_CHARS: usize = 20;

/// Truncate a push token for logs and API output.
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(TOKEN_PREVIEW_CHARS).collect();
    format!("{prefix}...")
}

/// Descriptive metadata supplied at registration. No effect on delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub device_type: String,
    pub app_version: String,
}

impl Default for DeviceMetadata {
    fn default() -> Self {
        Self {
            device_type: "android".into(),
            app_version: "1.0".into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device_id: String,
    pub push_token: String,
    pub metadata: DeviceMetadata,
    pub registered_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn masked_token(&self) -> String {
        mask_token(&self.push_token)
    }

    pub fn has_token(&self) -> bool {
        !self.push_token.trim().is_empty()
    }
}

impl std::fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("device_id", &self.device_id)
            .field("push_token", &self.masked_token())
            .field("metadata", &self.metadata)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Shared handle to the registered devices.
///
/// Iteration order is first-registration order; re-registering a device
/// replaces its record in place.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<IndexMap<String, DeviceRecord>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `device_id` (last write wins).
    /// Returns the stored record.
    pub fn register(
        &self,
        device_id: &str,
        push_token: &str,
        metadata: DeviceMetadata,
    ) -> DeviceRecord {
        let record = DeviceRecord {
            device_id: device_id.to_string(),
            push_token: push_token.to_string(),
            metadata,
            registered_at: Utc::now(),
        };

        let replaced = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.device_id.clone(), record.clone())
            .is_some();

        info!(
            "Device {} {} with token {}",
            record.device_id,
            if replaced { "re-registered" } else { "registered" },
            record.masked_token()
        );
        record
    }

    pub fn resolve(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }

    /// Snapshot of every record, in registration order.
    pub fn all(&self) -> Vec<DeviceRecord> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

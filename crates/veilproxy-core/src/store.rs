//! Persistent store of managed identities and their known devices.
//!
//! The bridge only reads from the store (identities at construction, the
//! whole device set on every cache refresh). Trust changes are written by
//! the daemon core.

use std::sync::PoisonError;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceMap, ManagedIdentity, StoredDevice, TrustState, build_device_map};

/// Single-file JSON store.
pub mod json_file;
/// In-process store for embedding and tests.
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// Errors raised by a [`DeviceStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is malformed: {0}")]
    Format(#[from] serde_json::Error),

    #[error("device {user_id}/{device_id} is not known to {identity}")]
    UnknownDevice {
        identity: String,
        user_id: String,
        device_id: String,
    },

    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(e: PoisonError<T>) -> Self {
        StoreError::Unavailable(format!("lock poisoned: {e}"))
    }
}

/// Outcome of [`DeviceStore::set_trust_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustUpdate {
    /// The state changed from `previous`.
    Changed { previous: TrustState },
    /// The device already had the requested state.
    Unchanged,
}

/// Authoritative source of identities and devices.
pub trait DeviceStore: Send + Sync {
    /// Every identity the daemon manages.
    fn load_all_identities(&self) -> Result<Vec<ManagedIdentity>, StoreError>;

    /// The complete device set, keyed by identity, user and device.
    fn load_all_devices(&self) -> Result<DeviceMap, StoreError>;

    /// Persist a new trust state for one device.
    fn set_trust_state(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
        state: TrustState,
    ) -> Result<TrustUpdate, StoreError>;
}

/// Serialized form shared by the store implementations.
///
/// ```json
/// {
///   "identities": [{"user_id": "@alice:example.org", "device_id": "PANDEV"}],
///   "devices": [{"identity": "@alice:example.org", "user_id": "@bob:example.org",
///                "device_id": "DEV1", "trust_state": "verified",
///                "ed25519": "...", "curve25519": "..."}]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub identities: Vec<ManagedIdentity>,
    #[serde(default)]
    pub devices: Vec<StoredDevice>,
}

impl StoreDocument {
    pub fn device_map(&self) -> DeviceMap {
        build_device_map(self.devices.iter().cloned())
    }

    /// Apply a trust change in place.
    pub fn set_trust_state(
        &mut self,
        identity: &str,
        user_id: &str,
        device_id: &str,
        state: TrustState,
    ) -> Result<TrustUpdate, StoreError> {
        let record = self
            .devices
            .iter_mut()
            .find(|r| {
                r.identity == identity
                    && r.device.user_id == user_id
                    && r.device.device_id == device_id
            })
            .ok_or_else(|| StoreError::UnknownDevice {
                identity: identity.to_string(),
                user_id: user_id.to_string(),
                device_id: device_id.to_string(),
            })?;

        let previous = record.device.trust_state;
        if previous == state {
            return Ok(TrustUpdate::Unchanged);
        }
        record.device.trust_state = state;
        Ok(TrustUpdate::Changed { previous })
    }
}

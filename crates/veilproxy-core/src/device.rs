//! Devices, managed identities and the device read cache.
//!
//! The cache is a projection of the persistent store keyed as
//! `identity → user id → device id → Device`. It is never patched in place:
//! a refresh builds a complete new map and swaps it in through a
//! `tokio::sync::watch` channel, so readers clone an `Arc` and never wait on
//! a writer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// An account the daemon proxies, paired with the daemon's own device for it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManagedIdentity {
    pub user_id: String,
    pub device_id: String,
}

impl ManagedIdentity {
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
        }
    }
}

/// Trust the managed identity places in a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustState {
    #[default]
    #[serde(alias = "unset")]
    Unverified,
    Verified,
    Blacklisted,
    Ignored,
}

impl TrustState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
            Self::Blacklisted => "blacklisted",
            Self::Ignored => "ignored",
        }
    }
}

impl fmt::Display for TrustState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" | "unset" => Ok(Self::Unverified),
            "verified" => Ok(Self::Verified),
            "blacklisted" => Ok(Self::Blacklisted),
            "ignored" => Ok(Self::Ignored),
            other => Err(format!("unknown trust state {other:?}")),
        }
    }
}

/// A cryptographic end-point belonging to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub user_id: String,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub trust_state: TrustState,
    /// Ed25519 fingerprint key.
    #[serde(default)]
    pub ed25519: String,
    /// Curve25519 identity key.
    #[serde(default)]
    pub curve25519: String,
}

/// `device id → Device` for one user.
pub type UserDevices = BTreeMap<String, Device>;
/// `user id → devices` as seen by one managed identity.
pub type IdentityDevices = BTreeMap<String, UserDevices>;
/// `identity → user id → device id → Device`.
pub type DeviceMap = BTreeMap<String, IdentityDevices>;

/// A device record as returned by the store, tagged with the identity that
/// knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDevice {
    pub identity: String,
    #[serde(flatten)]
    pub device: Device,
}

/// Build a [`DeviceMap`] from flat store records. Later duplicates win.
pub fn build_device_map(records: impl IntoIterator<Item = StoredDevice>) -> DeviceMap {
    let mut map = DeviceMap::new();
    for StoredDevice { identity, device } in records {
        map.entry(identity)
            .or_default()
            .entry(device.user_id.clone())
            .or_default()
            .insert(device.device_id.clone(), device);
    }
    map
}

/// Read cache of managed devices.
///
/// Cheap to clone; clones observe the same snapshots.
#[derive(Debug, Clone)]
pub struct DeviceCache {
    tx: Arc<watch::Sender<Arc<DeviceMap>>>,
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCache {
    /// An empty cache.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(DeviceMap::new()));
        Self { tx: Arc::new(tx) }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<DeviceMap> {
        Arc::clone(&self.tx.borrow())
    }

    /// Replace the whole map and return the number of devices it holds.
    pub fn replace(&self, map: DeviceMap) -> usize {
        let count = count_devices(&map);
        self.tx.send_replace(Arc::new(map));
        count
    }

    /// Receive a notification every time the snapshot is replaced.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DeviceMap>> {
        self.tx.subscribe()
    }

    /// All devices known to `identity`, ordered by user id then device id.
    pub fn list(&self, identity: &str) -> Vec<Device> {
        let snapshot = self.snapshot();
        snapshot
            .get(identity)
            .map(|users| {
                users
                    .values()
                    .flat_map(|devices| devices.values().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Devices of `user_id` as known to `identity`, ordered by device id.
    pub fn list_for_user(&self, identity: &str, user_id: &str) -> Vec<Device> {
        let snapshot = self.snapshot();
        snapshot
            .get(identity)
            .and_then(|users| users.get(user_id))
            .map(|devices| devices.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of devices across all identities.
    pub fn len(&self) -> usize {
        count_devices(&self.snapshot())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn count_devices(map: &DeviceMap) -> usize {
    map.values()
        .flat_map(|users| users.values())
        .map(BTreeMap::len)
        .sum()
}

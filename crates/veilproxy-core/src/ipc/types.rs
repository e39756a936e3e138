//! Shared request/response types for daemon IPC.
//!
//! These types are serialized as JSON over the Unix domain socket
//! transport. Both the IPC server (daemon) and client (CLI/TUI) use
//! these types. Request bodies default missing strings to empty so the
//! surfaces can reject them with a proper `missing required argument`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::correlation::CorrelationId;
use crate::device::Device;
use crate::message::Passphrase;
use crate::notification::SequencedNotification;

pub use crate::device::ManagedIdentity;

// ── Administration ──────────────────────────────────────────────────────

/// Daemon health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git_hash: String,
    pub build_profile: String,
}

/// One proxied homeserver as reported by `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub name: String,
    pub homeserver: String,
    pub listen: String,
    pub ssl: bool,
}

/// Daemon runtime status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub version: String,
    pub git_hash: String,
    pub uptime_secs: u64,
    pub pid: u32,
    pub log_level: String,
    pub servers: Vec<ServerStatus>,
    pub identities: usize,
    pub cached_devices: usize,
    /// The id the next command will receive.
    pub next_correlation_id: CorrelationId,
    pub last_notification_seq: u64,
}

/// Daemon shutdown response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub acknowledged: bool,
    pub message: String,
}

/// Log entry from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub elapsed_secs: f64,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// `GET /logs?limit=<n>` query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

/// Log listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub entries: Vec<LogEntry>,
    /// Entries held by the daemon, before `limit` was applied.
    pub total: usize,
}

/// Configuration response (serialized TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub toml: String,
}

/// Generic error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ── Control surface ─────────────────────────────────────────────────────

/// Body of `POST /control/export-keys` and `POST /control/import-keys`.
///
/// The passphrase is cleared when the body is dropped.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct KeyFileBody {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub passphrase: String,
}

impl KeyFileBody {
    /// Move the passphrase out, leaving an empty string behind.
    pub fn take_passphrase(&mut self) -> Passphrase {
        Passphrase::new(std::mem::take(&mut self.passphrase))
    }
}

impl fmt::Debug for KeyFileBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFileBody")
            .field("identity", &self.identity)
            .field("file_path", &self.file_path)
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

impl Drop for KeyFileBody {
    fn drop(&mut self) {
        self.passphrase.zeroize();
    }
}

/// Id assigned to an enqueued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandIssued {
    pub id: CorrelationId,
}

// ── Devices surface ─────────────────────────────────────────────────────

/// Body of `POST /devices/list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityBody {
    #[serde(default)]
    pub identity: String,
}

/// Body of `POST /devices/list-user`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDevicesBody {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub user_id: String,
}

/// Body of every device-level command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceBody {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub device_id: String,
}

/// Device listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
}

// ── Notifications ───────────────────────────────────────────────────────

/// `GET /notifications?after=<seq>&limit=<n>` query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsQuery {
    pub after: Option<u64>,
    pub limit: Option<usize>,
}

/// Notifications newer than the requested sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<SequencedNotification>,
    /// Newest sequence number the daemon has issued.
    pub last_seq: u64,
}

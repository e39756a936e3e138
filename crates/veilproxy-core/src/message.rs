//! Commands sent to the daemon core and events it sends back.
//!
//! Both directions travel over unbounded queues (see [`crate::queue`]).
//! Values are immutable once built; the bridge never keeps a record of
//! commands in flight.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::correlation::CorrelationId;

// ── Commands ────────────────────────────────────────────────────────────

/// Passphrase protecting an exported key file.
///
/// Cleared on drop and never shown in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase {
    inner: String,
}

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// The plaintext passphrase. Hand it to the key codec only.
    pub fn expose(&self) -> &str {
        &self.inner
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

impl Drop for Passphrase {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

/// Arguments of a key export or import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFileRequest {
    pub file_path: String,
    pub passphrase: Passphrase,
}

/// A device addressed by a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRef {
    pub user_id: String,
    pub device_id: String,
}

impl DeviceRef {
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
        }
    }
}

/// What a command asks the daemon core to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    ExportKeys(KeyFileRequest),
    ImportKeys(KeyFileRequest),
    VerifyDevice(DeviceRef),
    UnverifyDevice(DeviceRef),
    BlacklistDevice(DeviceRef),
    UnblacklistDevice(DeviceRef),
    StartVerification(DeviceRef),
    CancelVerification(DeviceRef),
    AcceptVerification(DeviceRef),
    ConfirmVerification(DeviceRef),
}

impl CommandKind {
    /// Short name used in logs and responses.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExportKeys(_) => "export-keys",
            Self::ImportKeys(_) => "import-keys",
            Self::VerifyDevice(_) => "verify-device",
            Self::UnverifyDevice(_) => "unverify-device",
            Self::BlacklistDevice(_) => "blacklist-device",
            Self::UnblacklistDevice(_) => "unblacklist-device",
            Self::StartVerification(_) => "start-verification",
            Self::CancelVerification(_) => "cancel-verification",
            Self::AcceptVerification(_) => "accept-verification",
            Self::ConfirmVerification(_) => "confirm-verification",
        }
    }

    /// The addressed device, for device-level commands.
    pub fn device(&self) -> Option<&DeviceRef> {
        match self {
            Self::ExportKeys(_) | Self::ImportKeys(_) => None,
            Self::VerifyDevice(d)
            | Self::UnverifyDevice(d)
            | Self::BlacklistDevice(d)
            | Self::UnblacklistDevice(d)
            | Self::StartVerification(d)
            | Self::CancelVerification(d)
            | Self::AcceptVerification(d)
            | Self::ConfirmVerification(d) => Some(d),
        }
    }
}

/// A command travelling from a surface to the daemon core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: CorrelationId,
    /// The managed identity (user id) the command acts for.
    pub identity: String,
    pub kind: CommandKind,
}

// ── Events ──────────────────────────────────────────────────────────────

/// An interactive SAS verification as seen by one managed identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SasTransaction {
    pub identity: String,
    pub user_id: String,
    pub device_id: String,
    pub transaction_id: String,
}

impl SasTransaction {
    pub fn new(
        identity: impl Into<String>,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            user_id: user_id.into(),
            device_id: device_id.into(),
            transaction_id: transaction_id.into(),
        }
    }
}

/// One entry of a short authentication string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub symbol: String,
    pub description: String,
}

impl Emoji {
    pub fn new(symbol: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            description: description.into(),
        }
    }
}

/// Outcome class of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseCode {
    Ok,
    Error,
    Unsupported,
}

impl ResponseCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result body carried by a command response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub code: ResponseCode,
    pub message: String,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::Error,
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::Unsupported,
            message: message.into(),
        }
    }
}

/// The daemon core's answer to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: CorrelationId,
    pub identity: String,
    pub reply: Reply,
}

/// Something the daemon core reports back to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The persistent device store changed; the read cache must be rebuilt.
    DevicesChanged,
    VerificationInvited(SasTransaction),
    VerificationStringReady {
        tx: SasTransaction,
        emoji: Vec<Emoji>,
    },
    VerificationCancelled {
        tx: SasTransaction,
        reason: String,
        code: String,
    },
    VerificationDone(SasTransaction),
    CommandResponse(CommandResponse),
}

impl Event {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DevicesChanged => "devices-changed",
            Self::VerificationInvited(_) => "verification-invited",
            Self::VerificationStringReady { .. } => "verification-string",
            Self::VerificationCancelled { .. } => "verification-cancelled",
            Self::VerificationDone(_) => "verification-done",
            Self::CommandResponse(_) => "command-response",
        }
    }

    /// The verification transaction this event belongs to, if any.
    pub fn transaction(&self) -> Option<&SasTransaction> {
        match self {
            Self::VerificationInvited(tx)
            | Self::VerificationStringReady { tx, .. }
            | Self::VerificationCancelled { tx, .. }
            | Self::VerificationDone(tx) => Some(tx),
            Self::DevicesChanged | Self::CommandResponse(_) => None,
        }
    }
}

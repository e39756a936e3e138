use std::sync::Arc;

use tracing::{debug, info};

use crate::correlation::{CorrelationCounter, CorrelationId};
use crate::device::{Device, DeviceCache};
use crate::message::{Command, CommandKind, DeviceRef};
use crate::queue::CommandSender;
use crate::store::{DeviceStore, StoreError};

use super::{SurfaceError, require};

/// Device listing, trust management and the SAS verification lifecycle.
///
/// Trust changes are not applied to the cache when requested. The cache
/// only moves when the core reports `DevicesChanged` and the dispatcher
/// calls [`refresh_cache`](Self::refresh_cache).
#[derive(Clone)]
pub struct DeviceSurface {
    store: Arc<dyn DeviceStore>,
    cache: DeviceCache,
    counter: CorrelationCounter,
    commands: CommandSender,
}

impl std::fmt::Debug for DeviceSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSurface")
            .field("cached_devices", &self.cache.len())
            .field("next_id", &self.counter.peek())
            .finish_non_exhaustive()
    }
}

impl DeviceSurface {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        counter: CorrelationCounter,
        commands: CommandSender,
    ) -> Self {
        Self {
            store,
            cache: DeviceCache::new(),
            counter,
            commands,
        }
    }

    /// Reload every device from the store and swap the new snapshot in.
    ///
    /// Readers keep using the previous snapshot until the swap. On error the
    /// previous snapshot stays in place.
    pub fn refresh_cache(&self) -> Result<usize, StoreError> {
        let map = self.store.load_all_devices()?;
        let count = self.cache.replace(map);
        info!(devices = count, "Device cache refreshed");
        Ok(count)
    }

    /// The read cache backing the listing operations.
    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    /// All devices known to `identity`.
    pub fn list(&self, identity: &str) -> Vec<Device> {
        self.cache.list(identity)
    }

    /// Devices of `user_id` known to `identity`.
    pub fn list_for_user(&self, identity: &str, user_id: &str) -> Vec<Device> {
        self.cache.list_for_user(identity, user_id)
    }

    pub fn verify(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CorrelationId, SurfaceError> {
        self.device_command(identity, user_id, device_id, CommandKind::VerifyDevice)
    }

    pub fn unverify(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CorrelationId, SurfaceError> {
        self.device_command(identity, user_id, device_id, CommandKind::UnverifyDevice)
    }

    pub fn blacklist(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CorrelationId, SurfaceError> {
        self.device_command(identity, user_id, device_id, CommandKind::BlacklistDevice)
    }

    pub fn unblacklist(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CorrelationId, SurfaceError> {
        self.device_command(identity, user_id, device_id, CommandKind::UnblacklistDevice)
    }

    pub fn start_verification(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CorrelationId, SurfaceError> {
        self.device_command(identity, user_id, device_id, CommandKind::StartVerification)
    }

    pub fn cancel_verification(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CorrelationId, SurfaceError> {
        self.device_command(identity, user_id, device_id, CommandKind::CancelVerification)
    }

    pub fn accept_verification(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CorrelationId, SurfaceError> {
        self.device_command(identity, user_id, device_id, CommandKind::AcceptVerification)
    }

    pub fn confirm_verification(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<CorrelationId, SurfaceError> {
        self.device_command(identity, user_id, device_id, CommandKind::ConfirmVerification)
    }

    fn device_command(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
        kind: fn(DeviceRef) -> CommandKind,
    ) -> Result<CorrelationId, SurfaceError> {
        require("identity", identity)?;
        require("user_id", user_id)?;
        require("device_id", device_id)?;

        let kind = kind(DeviceRef::new(user_id, device_id));
        let id = self.counter.next();
        debug!(%id, identity, user_id, device_id, command = kind.name(), "Enqueueing command");
        self.commands.send(Command {
            id,
            identity: identity.to_string(),
            kind,
        })?;
        Ok(id)
    }
}

//! Wiring of the control-plane bridge.
//!
//! [`Bridge::build`] loads the managed identities and the first device
//! snapshot from the store, shares one correlation counter between both
//! surfaces and hands back the [`EventDispatcher`] for the caller to spawn.

use std::sync::Arc;

use tracing::info;

use veilproxy_config::BridgeConfig;

use crate::correlation::CorrelationCounter;
use crate::dispatch::EventDispatcher;
use crate::notification::NotificationBus;
use crate::queue::BridgeQueues;
use crate::store::{DeviceStore, StoreError};
use crate::surface::{ControlSurface, DeviceSurface};

/// The externally reachable half of the bridge. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Bridge {
    pub control: ControlSurface,
    pub devices: DeviceSurface,
    pub notifications: NotificationBus,
    counter: CorrelationCounter,
}

impl Bridge {
    /// Build both surfaces and the dispatcher feeding `notifications`.
    ///
    /// Store failures here are fatal; later refresh failures are not.
    pub fn build(
        store: Arc<dyn DeviceStore>,
        queues: BridgeQueues,
        config: &BridgeConfig,
    ) -> Result<(Self, EventDispatcher), StoreError> {
        let identities = store.load_all_identities()?;
        let counter = CorrelationCounter::new();

        let control = ControlSurface::new(identities, counter.clone(), queues.commands.clone());
        let devices = DeviceSurface::new(store, counter.clone(), queues.commands);
        let cached = devices.refresh_cache()?;

        let notifications = NotificationBus::new(config.notification_history);
        let dispatcher = EventDispatcher::new(
            queues.events,
            devices.clone(),
            notifications.clone(),
            config.max_events_per_tick,
        );

        info!(
            identities = control.list_identities().len(),
            devices = cached,
            "Bridge ready"
        );

        Ok((
            Self {
                control,
                devices,
                notifications,
                counter,
            },
            dispatcher,
        ))
    }

    /// The counter shared by both surfaces.
    pub fn counter(&self) -> &CorrelationCounter {
        &self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::device::ManagedIdentity;
    use crate::message::Passphrase;
    use crate::queue::queues;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_surfaces_share_one_counter() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_identity(ManagedIdentity::new("alice", "PAN1"))
            .unwrap();
        let (bridge_queues, mut core) = queues();
        let (bridge, _dispatcher) =
            Bridge::build(store, bridge_queues, &BridgeConfig::default()).unwrap();

        let a = bridge
            .control
            .export_keys("alice", "/tmp/k", Passphrase::new("pw"))
            .unwrap();
        let b = bridge.devices.verify("alice", "bob", "DEV1").unwrap();
        let c = bridge
            .control
            .import_keys("alice", "/tmp/k", Passphrase::new("pw"))
            .unwrap();
        assert_eq!((a, b, c), (CorrelationId(0), CorrelationId(1), CorrelationId(2)));
        assert_eq!(bridge.counter().peek(), CorrelationId(3));

        let order: Vec<_> = std::iter::from_fn(|| core.commands.try_recv().ok())
            .map(|c| c.id)
            .collect();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn test_identities_loaded_at_build() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_identity(ManagedIdentity::new("alice", "PAN1"))
            .unwrap();
        let (bridge_queues, _core) = queues();
        let (bridge, _dispatcher) =
            Bridge::build(store.clone(), bridge_queues, &BridgeConfig::default()).unwrap();

        // Identities are a snapshot taken at build time
        store
            .add_identity(ManagedIdentity::new("carol", "PAN2"))
            .unwrap();
        assert_eq!(
            bridge.control.list_identities(),
            vec![ManagedIdentity::new("alice", "PAN1")]
        );
    }
}

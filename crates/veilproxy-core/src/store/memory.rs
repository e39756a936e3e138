use std::sync::Mutex;

use crate::device::{Device, DeviceMap, ManagedIdentity, StoredDevice, TrustState};

use super::{DeviceStore, StoreDocument, StoreError, TrustUpdate};

/// A [`DeviceStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<StoreDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an existing document.
    pub fn from_document(document: StoreDocument) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }

    /// Add a managed identity. Replaces an existing entry with the same user id.
    pub fn add_identity(&self, identity: ManagedIdentity) -> Result<(), StoreError> {
        let mut doc = self.document.lock()?;
        doc.identities.retain(|i| i.user_id != identity.user_id);
        doc.identities.push(identity);
        Ok(())
    }

    /// Add or replace a device known to `identity`.
    pub fn add_device(&self, identity: &str, device: Device) -> Result<(), StoreError> {
        let mut doc = self.document.lock()?;
        doc.devices.retain(|r| {
            !(r.identity == identity
                && r.device.user_id == device.user_id
                && r.device.device_id == device.device_id)
        });
        doc.devices.push(StoredDevice {
            identity: identity.to_string(),
            device,
        });
        Ok(())
    }

    /// A copy of the current contents.
    pub fn document(&self) -> Result<StoreDocument, StoreError> {
        Ok(self.document.lock()?.clone())
    }
}

impl DeviceStore for MemoryStore {
    fn load_all_identities(&self) -> Result<Vec<ManagedIdentity>, StoreError> {
        Ok(self.document.lock()?.identities.clone())
    }

    fn load_all_devices(&self) -> Result<DeviceMap, StoreError> {
        Ok(self.document.lock()?.device_map())
    }

    fn set_trust_state(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
        state: TrustState,
    ) -> Result<TrustUpdate, StoreError> {
        self.document
            .lock()?
            .set_trust_state(identity, user_id, device_id, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bob_dev1() -> Device {
        Device {
            user_id: "bob".to_string(),
            device_id: "DEV1".to_string(),
            display_name: None,
            trust_state: TrustState::Unverified,
            ed25519: "ed".to_string(),
            curve25519: "cu".to_string(),
        }
    }

    #[test]
    fn test_add_and_load() {
        let store = MemoryStore::new();
        store
            .add_identity(ManagedIdentity::new("alice", "PAN1"))
            .unwrap();
        store.add_device("alice", bob_dev1()).unwrap();

        assert_eq!(
            store.load_all_identities().unwrap(),
            vec![ManagedIdentity::new("alice", "PAN1")]
        );
        let devices = store.load_all_devices().unwrap();
        assert_eq!(devices["alice"]["bob"]["DEV1"], bob_dev1());
    }

    #[test]
    fn test_add_device_replaces() {
        let store = MemoryStore::new();
        store.add_device("alice", bob_dev1()).unwrap();
        let mut renamed = bob_dev1();
        renamed.display_name = Some("laptop".to_string());
        store.add_device("alice", renamed.clone()).unwrap();

        assert_eq!(store.document().unwrap().devices.len(), 1);
        assert_eq!(
            store.load_all_devices().unwrap()["alice"]["bob"]["DEV1"],
            renamed
        );
    }

    #[test]
    fn test_trust_update_visible_in_next_load() {
        let store = MemoryStore::new();
        store.add_device("alice", bob_dev1()).unwrap();
        store
            .set_trust_state("alice", "bob", "DEV1", TrustState::Blacklisted)
            .unwrap();
        assert_eq!(
            store.load_all_devices().unwrap()["alice"]["bob"]["DEV1"].trust_state,
            TrustState::Blacklisted
        );
    }
}

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::device::{DeviceMap, ManagedIdentity, TrustState};

use super::{DeviceStore, StoreDocument, StoreError, TrustUpdate};

/// File name of the store inside the data directory.
pub const STORE_FILE_NAME: &str = "store.json";

/// A [`DeviceStore`] backed by a single JSON document.
///
/// A missing file reads as an empty store. Writes go to a temporary file
/// next to the document which is then renamed over it, so readers never see
/// a partial document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store at an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `<data_dir>/store.json`.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document.
    pub fn read(&self) -> Result<StoreDocument, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the whole document.
    pub fn write(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock()?;
        self.write_unlocked(document)
    }

    fn write_unlocked(&self, document: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(document)?;
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(
            path = %self.path.display(),
            identities = document.identities.len(),
            devices = document.devices.len(),
            "Store written"
        );
        Ok(())
    }
}

impl DeviceStore for JsonFileStore {
    fn load_all_identities(&self) -> Result<Vec<ManagedIdentity>, StoreError> {
        Ok(self.read()?.identities)
    }

    fn load_all_devices(&self) -> Result<DeviceMap, StoreError> {
        Ok(self.read()?.device_map())
    }

    fn set_trust_state(
        &self,
        identity: &str,
        user_id: &str,
        device_id: &str,
        state: TrustState,
    ) -> Result<TrustUpdate, StoreError> {
        let _guard = self.write_lock.lock()?;
        let mut document = self.read()?;
        let update = document.set_trust_state(identity, user_id, device_id, state)?;
        if update != TrustUpdate::Unchanged {
            self.write_unlocked(&document)?;
        }
        Ok(update)
    }
}

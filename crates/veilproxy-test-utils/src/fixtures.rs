//! Identity and device fixtures.
//!
//! The canonical scenario: managed identity `alice` (own device `PAN1`)
//! knows one device `DEV1` of user `bob`.

use std::sync::Arc;

use veilproxy_core::device::{Device, ManagedIdentity, TrustState};
use veilproxy_core::store::MemoryStore;

pub const ALICE: &str = "alice";
pub const ALICE_DEVICE: &str = "PAN1";
pub const BOB: &str = "bob";
pub const BOB_DEVICE: &str = "DEV1";

/// An unverified device with deterministic fake keys.
pub fn device(user_id: &str, device_id: &str) -> Device {
    Device {
        user_id: user_id.to_string(),
        device_id: device_id.to_string(),
        display_name: None,
        trust_state: TrustState::Unverified,
        ed25519: format!("ed25519:{user_id}:{device_id}"),
        curve25519: format!("curve25519:{user_id}:{device_id}"),
    }
}

/// `alice` managing one device of `bob`.
pub fn alice_and_bob() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .add_identity(ManagedIdentity::new(ALICE, ALICE_DEVICE))
        .expect("in-memory store");
    store
        .add_device(ALICE, device(BOB, BOB_DEVICE))
        .expect("in-memory store");
    store
}

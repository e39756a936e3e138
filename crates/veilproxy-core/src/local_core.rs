//! In-process daemon core.
//!
//! Consumes the command queue and answers every command with exactly one
//! `CommandResponse`. Trust changes are written to the store and announced
//! with `DevicesChanged` ahead of the response, so a client that sees the
//! response and then lists devices observes the new state once the
//! dispatcher has refreshed the cache.
//!
//! Key export/import and interactive verification need the end-to-end
//! encryption machinery of the proxy, which lives outside this workspace;
//! those commands are answered with `unsupported`.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::daemon::ShutdownSignal;
use crate::device::TrustState;
use crate::message::{Command, CommandKind, CommandResponse, DeviceRef, Event, Reply};
use crate::queue::CoreQueues;
use crate::store::{DeviceStore, StoreError, TrustUpdate};

/// Trust command after it has been checked against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrustChange {
    Set(TrustState),
    Keep(&'static str),
}

/// Queue-driven task around a [`CommandHandler`].
pub struct LocalCore {
    handler: CommandHandler,
    queues: CoreQueues,
}

impl LocalCore {
    pub fn new(store: Arc<dyn DeviceStore>, queues: CoreQueues) -> Self {
        Self {
            handler: CommandHandler::new(store),
            queues,
        }
    }

    /// Process commands until the queue closes or shutdown is signalled.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<ShutdownSignal>) {
        info!("Daemon core started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Daemon core shutting down");
                    break;
                }
                command = self.queues.commands.recv() => {
                    let Some(command) = command else {
                        info!("Command queue closed, daemon core stopping");
                        break;
                    };
                    for event in self.handler.handle(command) {
                        if self.queues.events.send(event).is_err() {
                            warn!("Event queue closed, dropping event");
                        }
                    }
                }
            }
        }
    }
}

/// Turns one command into the events answering it.
pub struct CommandHandler {
    store: Arc<dyn DeviceStore>,
}

impl CommandHandler {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self { store }
    }

    /// Events produced in answer to one command, in emission order.
    pub fn handle(&self, command: Command) -> Vec<Event> {
        let Command { id, identity, kind } = command;
        debug!(%id, identity = %identity, command = kind.name(), "Daemon core got command");

        let (changed, reply) = match self.apply(&identity, &kind) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%id, identity = %identity, command = kind.name(), error = %e, "Command failed");
                (false, Reply::error(e.to_string()))
            }
        };

        let mut events = Vec::with_capacity(2);
        if changed {
            events.push(Event::DevicesChanged);
        }
        events.push(Event::CommandResponse(CommandResponse {
            id,
            identity,
            reply,
        }));
        events
    }

    fn apply(&self, identity: &str, kind: &CommandKind) -> Result<(bool, Reply), StoreError> {
        let known = self
            .store
            .load_all_identities()?
            .iter()
            .any(|i| i.user_id == identity);
        if !known {
            return Ok((false, Reply::error(format!("unknown identity {identity}"))));
        }

        match kind {
            CommandKind::ExportKeys(_) | CommandKind::ImportKeys(_) => Ok((
                false,
                Reply::unsupported(format!("{} is not available in this daemon", kind.name())),
            )),
            CommandKind::StartVerification(_)
            | CommandKind::CancelVerification(_)
            | CommandKind::AcceptVerification(_)
            | CommandKind::ConfirmVerification(_) => Ok((
                false,
                Reply::unsupported("interactive verification is not available in this daemon"),
            )),
            CommandKind::VerifyDevice(device)
            | CommandKind::UnverifyDevice(device)
            | CommandKind::BlacklistDevice(device)
            | CommandKind::UnblacklistDevice(device) => self.apply_trust(identity, kind, device),
        }
    }

    fn apply_trust(
        &self,
        identity: &str,
        kind: &CommandKind,
        device: &DeviceRef,
    ) -> Result<(bool, Reply), StoreError> {
        let current = self
            .store
            .load_all_devices()?
            .get(identity)
            .and_then(|users| users.get(&device.user_id))
            .and_then(|devices| devices.get(&device.device_id))
            .map(|d| d.trust_state)
            .ok_or_else(|| StoreError::UnknownDevice {
                identity: identity.to_string(),
                user_id: device.user_id.clone(),
                device_id: device.device_id.clone(),
            })?;

        let change = match (kind, current) {
            (CommandKind::VerifyDevice(_), _) => TrustChange::Set(TrustState::Verified),
            (CommandKind::BlacklistDevice(_), _) => TrustChange::Set(TrustState::Blacklisted),
            (CommandKind::UnverifyDevice(_), TrustState::Verified) => {
                TrustChange::Set(TrustState::Unverified)
            }
            (CommandKind::UnverifyDevice(_), _) => TrustChange::Keep("not verified"),
            (CommandKind::UnblacklistDevice(_), TrustState::Blacklisted) => {
                TrustChange::Set(TrustState::Unverified)
            }
            (CommandKind::UnblacklistDevice(_), _) => TrustChange::Keep("not blacklisted"),
            _ => TrustChange::Keep("unchanged"),
        };

        let target = match change {
            TrustChange::Set(target) => target,
            TrustChange::Keep(why) => {
                return Ok((
                    false,
                    Reply::ok(format!(
                        "device {} of {} is {why}",
                        device.device_id, device.user_id
                    )),
                ));
            }
        };

        let update =
            self.store
                .set_trust_state(identity, &device.user_id, &device.device_id, target)?;
        Ok(match update {
            TrustUpdate::Changed { previous } => {
                info!(
                    identity,
                    user_id = %device.user_id,
                    device_id = %device.device_id,
                    from = %previous,
                    to = %target,
                    "Device trust changed"
                );
                (
                    true,
                    Reply::ok(format!(
                        "device {} of {} is now {target}",
                        device.device_id, device.user_id
                    )),
                )
            }
            TrustUpdate::Unchanged => (
                false,
                Reply::ok(format!(
                    "device {} of {} is already {target}",
                    device.device_id, device.user_id
                )),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::device::{Device, ManagedIdentity};
    use crate::message::{KeyFileRequest, Passphrase, ResponseCode};
    use crate::queue::queues;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn store_with(state: TrustState) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .add_identity(ManagedIdentity::new("alice", "PAN1"))
            .unwrap();
        store
            .add_device(
                "alice",
                Device {
                    user_id: "bob".to_string(),
                    device_id: "DEV1".to_string(),
                    display_name: None,
                    trust_state: state,
                    ed25519: "ed".to_string(),
                    curve25519: "cu".to_string(),
                },
            )
            .unwrap();
        store
    }

    fn core(store: &Arc<MemoryStore>) -> CommandHandler {
        CommandHandler::new(Arc::clone(store) as Arc<dyn DeviceStore>)
    }

    fn command(kind: CommandKind) -> Command {
        Command {
            id: CorrelationId(4),
            identity: "alice".to_string(),
            kind,
        }
    }

    fn reply_of(events: &[Event]) -> &Reply {
        match events.last() {
            Some(Event::CommandResponse(r)) => &r.reply,
            other => panic!("expected a response last, got {other:?}"),
        }
    }

    fn bob() -> DeviceRef {
        DeviceRef::new("bob", "DEV1")
    }

    #[test]
    fn test_verify_changes_store_and_announces() {
        let store = store_with(TrustState::Unverified);
        let events = core(&store).handle(command(CommandKind::VerifyDevice(bob())));

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::DevicesChanged);
        assert_eq!(reply_of(&events).code, ResponseCode::Ok);
        assert_eq!(
            store.load_all_devices().unwrap()["alice"]["bob"]["DEV1"].trust_state,
            TrustState::Verified
        );
    }

    #[test]
    fn test_verify_already_verified() {
        let store = store_with(TrustState::Verified);
        let events = core(&store).handle(command(CommandKind::VerifyDevice(bob())));
        assert_eq!(events.len(), 1);
        assert!(reply_of(&events).message.contains("already verified"));
    }

    #[test]
    fn test_unblacklist_only_touches_blacklisted() {
        let store = store_with(TrustState::Verified);
        let events = core(&store).handle(command(CommandKind::UnblacklistDevice(bob())));
        assert_eq!(events.len(), 1);
        assert!(reply_of(&events).message.contains("not blacklisted"));

        let store = store_with(TrustState::Blacklisted);
        let events = core(&store).handle(command(CommandKind::UnblacklistDevice(bob())));
        assert_eq!(events[0], Event::DevicesChanged);
        assert_eq!(
            store.load_all_devices().unwrap()["alice"]["bob"]["DEV1"].trust_state,
            TrustState::Unverified
        );
    }

    #[test]
    fn test_unknown_device_is_an_error_response() {
        let store = store_with(TrustState::Unverified);
        let events = core(&store).handle(command(CommandKind::BlacklistDevice(DeviceRef::new(
            "carol", "C1",
        ))));
        assert_eq!(events.len(), 1);
        assert_eq!(reply_of(&events).code, ResponseCode::Error);
    }

    #[test]
    fn test_unknown_identity_is_an_error_response() {
        let store = store_with(TrustState::Unverified);
        let mut cmd = command(CommandKind::VerifyDevice(bob()));
        cmd.identity = "mallory".to_string();
        let events = core(&store).handle(cmd);
        let reply = reply_of(&events);
        assert_eq!(reply.code, ResponseCode::Error);
        assert!(reply.message.contains("mallory"));
    }

    #[test]
    fn test_key_commands_unsupported() {
        let store = store_with(TrustState::Unverified);
        let events = core(&store).handle(command(CommandKind::ExportKeys(KeyFileRequest {
            file_path: "/tmp/k.txt".to_string(),
            passphrase: Passphrase::new("pw"),
        })));
        match &events[..] {
            [Event::CommandResponse(r)] => {
                assert_eq!(r.id, CorrelationId(4));
                assert_eq!(r.reply.code, ResponseCode::Unsupported);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_answers_until_queue_closes() {
        let store = store_with(TrustState::Unverified);
        let (bridge, core_queues) = queues();
        let core = LocalCore::new(store as Arc<dyn DeviceStore>, core_queues);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(core.run(shutdown_rx));

        let crate::queue::BridgeQueues {
            commands,
            mut events,
        } = bridge;
        commands
            .send(command(CommandKind::StartVerification(bob())))
            .unwrap();
        drop(commands);
        task.await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, Event::CommandResponse(_)));
    }
}

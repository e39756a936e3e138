use std::sync::Arc;

use tracing::debug;

use crate::correlation::{CorrelationCounter, CorrelationId};
use crate::device::ManagedIdentity;
use crate::message::{Command, CommandKind, KeyFileRequest, Passphrase};
use crate::queue::CommandSender;

use super::{SurfaceError, require};

/// Account-level operations: list identities, export and import keys.
#[derive(Debug, Clone)]
pub struct ControlSurface {
    identities: Arc<Vec<ManagedIdentity>>,
    counter: CorrelationCounter,
    commands: CommandSender,
}

impl ControlSurface {
    pub fn new(
        identities: Vec<ManagedIdentity>,
        counter: CorrelationCounter,
        commands: CommandSender,
    ) -> Self {
        Self {
            identities: Arc::new(identities),
            counter,
            commands,
        }
    }

    /// The identities loaded when the bridge was built.
    pub fn list_identities(&self) -> Vec<ManagedIdentity> {
        self.identities.as_ref().clone()
    }

    /// Ask the core to export `identity`'s room keys to `file_path`.
    pub fn export_keys(
        &self,
        identity: &str,
        file_path: &str,
        passphrase: Passphrase,
    ) -> Result<CorrelationId, SurfaceError> {
        let request = key_file_request(identity, file_path, passphrase)?;
        self.submit(identity, CommandKind::ExportKeys(request))
    }

    /// Ask the core to import room keys for `identity` from `file_path`.
    pub fn import_keys(
        &self,
        identity: &str,
        file_path: &str,
        passphrase: Passphrase,
    ) -> Result<CorrelationId, SurfaceError> {
        let request = key_file_request(identity, file_path, passphrase)?;
        self.submit(identity, CommandKind::ImportKeys(request))
    }

    fn submit(&self, identity: &str, kind: CommandKind) -> Result<CorrelationId, SurfaceError> {
        let id = self.counter.next();
        debug!(%id, identity, command = kind.name(), "Enqueueing command");
        self.commands.send(Command {
            id,
            identity: identity.to_string(),
            kind,
        })?;
        Ok(id)
    }
}

fn key_file_request(
    identity: &str,
    file_path: &str,
    passphrase: Passphrase,
) -> Result<KeyFileRequest, SurfaceError> {
    require("identity", identity)?;
    require("file_path", file_path)?;
    if passphrase.is_empty() {
        return Err(SurfaceError::MissingArgument("passphrase"));
    }
    Ok(KeyFileRequest {
        file_path: file_path.to_string(),
        passphrase,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{CoreQueues, QueueClosed, queues};
    use pretty_assertions::assert_eq;

    fn surface() -> (ControlSurface, CoreQueues) {
        let (bridge, core) = queues();
        let surface = ControlSurface::new(
            vec![ManagedIdentity::new("alice", "PAN1")],
            CorrelationCounter::new(),
            bridge.commands,
        );
        (surface, core)
    }

    #[test]
    fn test_list_identities() {
        let (surface, _core) = surface();
        assert_eq!(
            surface.list_identities(),
            vec![ManagedIdentity::new("alice", "PAN1")]
        );
    }

    #[test]
    fn test_export_keys_enqueues_one_command() {
        let (surface, mut core) = surface();
        let id = surface
            .export_keys("alice", "/tmp/k.txt", Passphrase::new("pw"))
            .unwrap();
        assert_eq!(id, CorrelationId(0));

        let command = core.commands.try_recv().unwrap();
        assert_eq!(command.id, id);
        assert_eq!(command.identity, "alice");
        match command.kind {
            CommandKind::ExportKeys(req) => {
                assert_eq!(req.file_path, "/tmp/k.txt");
                assert_eq!(req.passphrase.expose(), "pw");
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(core.commands.try_recv().is_err());
    }

    #[test]
    fn test_import_keys_uses_next_id() {
        let (surface, mut core) = surface();
        surface
            .export_keys("alice", "/tmp/a", Passphrase::new("pw"))
            .unwrap();
        let id = surface
            .import_keys("alice", "/tmp/b", Passphrase::new("pw"))
            .unwrap();
        assert_eq!(id, CorrelationId(1));
        core.commands.try_recv().unwrap();
        assert!(matches!(
            core.commands.try_recv().unwrap().kind,
            CommandKind::ImportKeys(_)
        ));
    }

    #[test]
    fn test_missing_arguments_fail_before_enqueue() {
        let (surface, mut core) = surface();
        assert_eq!(
            surface.export_keys("", "/tmp/k", Passphrase::new("pw")),
            Err(SurfaceError::MissingArgument("identity"))
        );
        assert_eq!(
            surface.import_keys("alice", "", Passphrase::new("pw")),
            Err(SurfaceError::MissingArgument("file_path"))
        );
        assert_eq!(
            surface.export_keys("alice", "/tmp/k", Passphrase::new("")),
            Err(SurfaceError::MissingArgument("passphrase"))
        );
        assert!(core.commands.try_recv().is_err());
    }

    #[test]
    fn test_queue_closed() {
        let (surface, core) = surface();
        drop(core);
        assert_eq!(
            surface.export_keys("alice", "/tmp/k", Passphrase::new("pw")),
            Err(SurfaceError::QueueClosed(QueueClosed))
        );
    }
}

//! The two queues between the bridge and the daemon core.
//!
//! ```text
//!   surfaces ──CommandSender──▶ [commands] ──▶ daemon core
//!   dispatcher ◀── [events] ◀──EventSender── daemon core
//! ```
//!
//! Both are unbounded: enqueueing never blocks and never applies
//! backpressure. The core is expected to drain commands promptly.

use tokio::sync::mpsc;

use crate::message::{Command, Event};

/// The receiving side has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue closed: the daemon core is not running")]
pub struct QueueClosed;

/// Sending half of the outbound command queue.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    /// Append a command. Never blocks.
    pub fn send(&self, command: Command) -> Result<(), QueueClosed> {
        self.tx.send(command).map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Sending half of the inbound event queue, held by the daemon core.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Append an event. Never blocks.
    pub fn send(&self, event: Event) -> Result<(), QueueClosed> {
        self.tx.send(event).map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Queue ends owned by the bridge.
#[derive(Debug)]
pub struct BridgeQueues {
    pub commands: CommandSender,
    pub events: EventReceiver,
}

/// Queue ends owned by the daemon core.
#[derive(Debug)]
pub struct CoreQueues {
    pub commands: CommandReceiver,
    pub events: EventSender,
}

/// Create both queues and split them between bridge and core.
pub fn queues() -> (BridgeQueues, CoreQueues) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        BridgeQueues {
            commands: CommandSender { tx: command_tx },
            events: event_rx,
        },
        CoreQueues {
            commands: command_rx,
            events: EventSender { tx: event_tx },
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::message::{CommandKind, DeviceRef};
    use pretty_assertions::assert_eq;

    fn verify(id: u64) -> Command {
        Command {
            id: CorrelationId(id),
            identity: "alice".to_string(),
            kind: CommandKind::VerifyDevice(DeviceRef::new("bob", "DEV1")),
        }
    }

    #[tokio::test]
    async fn test_commands_arrive_in_order() {
        let (bridge, mut core) = queues();
        for id in 0..5 {
            bridge.commands.send(verify(id)).unwrap();
        }
        for id in 0..5 {
            assert_eq!(core.commands.recv().await.unwrap().id, CorrelationId(id));
        }
    }

    #[test]
    fn test_send_after_core_dropped() {
        let (bridge, core) = queues();
        drop(core);
        assert!(bridge.commands.is_closed());
        assert_eq!(bridge.commands.send(verify(0)), Err(QueueClosed));
    }

    #[test]
    fn test_events_flow_back() {
        let (mut bridge, core) = queues();
        core.events.send(Event::DevicesChanged).unwrap();
        assert_eq!(bridge.events.try_recv().unwrap(), Event::DevicesChanged);
        assert!(bridge.events.try_recv().is_err());
    }
}

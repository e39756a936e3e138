//! In-process bridge harness.
//!
//! [`TestBridge`] owns both halves of the queues so tests can play the
//! daemon core by hand: drain commands, push events and tick the
//! dispatcher without any timers.

use std::sync::Arc;

use veilproxy_config::BridgeConfig;
use veilproxy_core::bridge::Bridge;
use veilproxy_core::dispatch::EventDispatcher;
use veilproxy_core::local_core::CommandHandler;
use veilproxy_core::message::{Command, Event};
use veilproxy_core::notification::{Notification, SequencedNotification};
use veilproxy_core::queue::{CoreQueues, queues};
use veilproxy_core::store::{DeviceStore, MemoryStore};

use crate::fixtures;

pub struct TestBridge {
    pub store: Arc<MemoryStore>,
    pub bridge: Bridge,
    pub dispatcher: EventDispatcher,
    pub core: CoreQueues,
}

impl TestBridge {
    /// Bridge over the `alice`/`bob` fixture with default settings.
    pub fn alice_and_bob() -> Self {
        Self::new(fixtures::alice_and_bob(), &BridgeConfig::default())
    }

    pub fn new(store: Arc<MemoryStore>, config: &BridgeConfig) -> Self {
        let (bridge_queues, core) = queues();
        let (bridge, dispatcher) = Bridge::build(
            Arc::clone(&store) as Arc<dyn DeviceStore>,
            bridge_queues,
            config,
        )
        .expect("fixture store never fails");
        Self {
            store,
            bridge,
            dispatcher,
            core,
        }
    }

    /// Every command enqueued so far, oldest first.
    pub fn take_commands(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(command) = self.core.commands.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Push an event as the daemon core would.
    pub fn emit(&self, event: Event) {
        self.core.events.send(event).expect("dispatcher side is alive");
    }

    /// Answer every pending command with the in-process core logic.
    ///
    /// Returns how many commands were answered.
    pub fn answer_pending(&mut self) -> usize {
        let handler = CommandHandler::new(Arc::clone(&self.store) as Arc<dyn DeviceStore>);
        let commands = self.take_commands();
        let answered = commands.len();
        for command in commands {
            for event in handler.handle(command) {
                self.emit(event);
            }
        }
        answered
    }

    /// Tick until a tick consumes nothing. Returns the total consumed.
    pub fn tick_until_idle(&mut self) -> usize {
        let mut total = 0;
        loop {
            let consumed = self.dispatcher.tick();
            if consumed == 0 {
                return total;
            }
            total += consumed;
        }
    }

    /// Full notification history, oldest first.
    pub fn history(&self) -> Vec<SequencedNotification> {
        self.bridge.notifications.since(0, usize::MAX)
    }

    /// Notification payloads without their sequence numbers.
    pub fn notifications(&self) -> Vec<Notification> {
        self.history()
            .into_iter()
            .map(|entry| entry.notification)
            .collect()
    }
}

//! Event dispatch loop.
//!
//! A recurring task drains the inbound event queue a few entries at a time
//! and turns each event into a notification, or a cache refresh for
//! `DevicesChanged`. The drain itself ([`EventDispatcher::tick`]) is
//! synchronous and never waits, so it can share a runtime with the IPC
//! handlers and the daemon core without starving them.
//!
//! ```text
//!   interval ──tick──▶ try_recv ×N ──▶ DevicesChanged ──▶ refresh_cache()
//!                                  └─▶ verification / response ──▶ NotificationBus
//! ```
//!
//! Verification events are relayed as they arrive, with one exception:
//! `Done` and `Cancelled` are mutually exclusive per transaction. Once a
//! transaction has finished, a second terminal event for it is a dispatch
//! failure and is dropped. Non-terminal events (`Invited`, `StringReady`)
//! are never checked against the tracker and are relayed even after the
//! transaction finished; the client sees them in arrival order.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::message::{CommandResponse, Event, SasTransaction};
use crate::notification::{Notification, NotificationBus};
use crate::queue::EventReceiver;
use crate::store::StoreError;
use crate::surface::DeviceSurface;

/// Number of finished verifications remembered for duplicate detection.
pub const TERMINAL_MEMORY: usize = 1024;

/// A dequeued event that could not be dispatched. Logged, never retried.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("device cache refresh failed: {0}")]
    Refresh(#[from] StoreError),

    #[error(
        "{event} for transaction {transaction_id} of {identity} after it already finished"
    )]
    AlreadyFinished {
        event: &'static str,
        identity: String,
        transaction_id: String,
    },
}

/// Remembers which verifications reached `Done` or `Cancelled`.
///
/// Bounded: once full, the oldest finished transaction is forgotten.
#[derive(Debug)]
pub struct VerificationTracker {
    finished: HashSet<SasTransaction>,
    order: VecDeque<SasTransaction>,
    capacity: usize,
}

impl Default for VerificationTracker {
    fn default() -> Self {
        Self::new(TERMINAL_MEMORY)
    }
}

impl VerificationTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            finished: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a terminal event. Returns `false` if the transaction had
    /// already finished.
    pub fn finish(&mut self, tx: &SasTransaction) -> bool {
        if self.finished.contains(tx) {
            return false;
        }
        if self.order.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.finished.remove(&oldest);
        }
        self.finished.insert(tx.clone());
        self.order.push_back(tx.clone());
        true
    }

    pub fn is_finished(&self, tx: &SasTransaction) -> bool {
        self.finished.contains(tx)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub ticks: u64,
    pub consumed: u64,
    pub failed: u64,
}

/// Drains the event queue into the notification bus.
pub struct EventDispatcher {
    events: EventReceiver,
    devices: DeviceSurface,
    bus: NotificationBus,
    tracker: VerificationTracker,
    max_events_per_tick: usize,
    stats: DispatchStats,
    closed: bool,
}

impl EventDispatcher {
    pub fn new(
        events: EventReceiver,
        devices: DeviceSurface,
        bus: NotificationBus,
        max_events_per_tick: usize,
    ) -> Self {
        Self {
            events,
            devices,
            bus,
            tracker: VerificationTracker::default(),
            max_events_per_tick: max_events_per_tick.max(1),
            stats: DispatchStats::default(),
            closed: false,
        }
    }

    /// Dispatch at most `max_events_per_tick` queued events without waiting.
    ///
    /// Returns how many events were consumed. Every dequeued event counts,
    /// whether or not it dispatched cleanly.
    pub fn tick(&mut self) -> usize {
        self.stats.ticks += 1;
        let mut consumed = 0;

        while consumed < self.max_events_per_tick {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        info!("Event queue closed by the daemon core");
                        self.closed = true;
                    }
                    break;
                }
            };
            consumed += 1;
            self.stats.consumed += 1;

            let name = event.name();
            if let Err(e) = self.dispatch(event) {
                self.stats.failed += 1;
                warn!(event = name, error = %e, "Event dispatch failed");
            }
        }

        consumed
    }

    /// Whether the core dropped its end and the queue is drained.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    fn dispatch(&mut self, event: Event) -> Result<(), DispatchError> {
        let notification = match event {
            Event::DevicesChanged => {
                self.devices.refresh_cache()?;
                return Ok(());
            }
            Event::CommandResponse(CommandResponse {
                id,
                identity,
                reply,
            }) => Notification::Response {
                id,
                identity,
                response: reply,
            },
            Event::VerificationInvited(tx) => Notification::VerificationInvite(tx),
            Event::VerificationStringReady { tx, emoji } => {
                Notification::VerificationString { tx, emoji }
            }
            Event::VerificationCancelled { tx, reason, code } => {
                self.finish(&tx, "verification-cancelled")?;
                Notification::VerificationCancel { tx, reason, code }
            }
            Event::VerificationDone(tx) => {
                self.finish(&tx, "verification-done")?;
                Notification::VerificationDone(tx)
            }
        };

        let seq = self.bus.emit(notification);
        debug!(seq, "Event relayed");
        Ok(())
    }

    fn finish(&mut self, tx: &SasTransaction, event: &'static str) -> Result<(), DispatchError> {
        if self.tracker.finish(tx) {
            Ok(())
        } else {
            Err(DispatchError::AlreadyFinished {
                event,
                identity: tx.identity.clone(),
                transaction_id: tx.transaction_id.clone(),
            })
        }
    }

    /// Run [`tick`](Self::tick) every `period` on the current runtime.
    pub fn spawn(self, period: Duration) -> DispatcherHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(period, stop_rx));
        DispatcherHandle { stop_tx, join }
    }

    async fn run(mut self, period: Duration, mut stop_rx: oneshot::Receiver<()>) -> DispatchStats {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "Event dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = interval.tick() => {
                    self.tick();
                    if self.closed {
                        break;
                    }
                }
            }
        }

        info!(
            ticks = self.stats.ticks,
            consumed = self.stats.consumed,
            failed = self.stats.failed,
            "Event dispatcher stopped"
        );
        self.stats
    }
}

/// Handle to a spawned dispatch loop.
#[derive(Debug)]
pub struct DispatcherHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<DispatchStats>,
}

impl DispatcherHandle {
    /// Stop rescheduling and wait for the loop to exit.
    ///
    /// An event already dequeued finishes dispatching first; nothing is
    /// dequeued afterwards.
    pub async fn stop(self) -> Result<DispatchStats, tokio::task::JoinError> {
        // Err means the loop already exited on its own.
        let _ = self.stop_tx.send(());
        self.join.await
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

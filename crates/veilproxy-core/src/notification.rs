//! Outward notifications and the bus that distributes them.
//!
//! Every notification gets a sequence number (starting at 1) and is kept in
//! a bounded history so IPC clients can poll with
//! `GET /notifications?after=<seq>`. In-process listeners subscribe to a
//! broadcast channel instead.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::correlation::CorrelationId;
use crate::message::{Emoji, Reply, SasTransaction};

/// Outward form of a daemon event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    /// Result of a command, correlated by id.
    Response {
        id: CorrelationId,
        identity: String,
        response: Reply,
    },
    VerificationInvite(SasTransaction),
    VerificationString {
        #[serde(flatten)]
        tx: SasTransaction,
        emoji: Vec<Emoji>,
    },
    VerificationCancel {
        #[serde(flatten)]
        tx: SasTransaction,
        reason: String,
        code: String,
    },
    VerificationDone(SasTransaction),
}

impl Notification {
    /// The verification transaction, for SAS notifications.
    pub fn transaction(&self) -> Option<&SasTransaction> {
        match self {
            Self::Response { .. } => None,
            Self::VerificationInvite(tx)
            | Self::VerificationString { tx, .. }
            | Self::VerificationCancel { tx, .. }
            | Self::VerificationDone(tx) => Some(tx),
        }
    }
}

/// A notification stamped by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedNotification {
    pub seq: u64,
    pub notification: Notification,
}

#[derive(Debug)]
struct History {
    last_seq: u64,
    entries: VecDeque<SequencedNotification>,
    capacity: usize,
}

/// Fan-out point for notifications.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    history: Arc<Mutex<History>>,
    tx: broadcast::Sender<SequencedNotification>,
}

impl NotificationBus {
    /// Create a bus keeping the last `capacity` notifications (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            history: Arc::new(Mutex::new(History {
                last_seq: 0,
                entries: VecDeque::with_capacity(capacity),
                capacity,
            })),
            tx,
        }
    }

    /// Stamp, record and broadcast a notification. Returns its sequence number.
    pub fn emit(&self, notification: Notification) -> u64 {
        let stamped = {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.last_seq += 1;
            let stamped = SequencedNotification {
                seq: history.last_seq,
                notification,
            };
            if history.entries.len() >= history.capacity {
                history.entries.pop_front();
            }
            history.entries.push_back(stamped.clone());
            stamped
        };

        let seq = stamped.seq;
        // No receivers is fine: pollers read the history.
        let receivers = self.tx.send(stamped).unwrap_or(0);
        trace!(seq, receivers, "Notification emitted");
        seq
    }

    /// Up to `limit` notifications with a sequence number above `after`,
    /// oldest first.
    pub fn since(&self, after: u64, limit: usize) -> Vec<SequencedNotification> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history
            .entries
            .iter()
            .filter(|n| n.seq > after)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Sequence number of the newest notification, `0` before the first.
    pub fn last_seq(&self) -> u64 {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_seq
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SequencedNotification> {
        self.tx.subscribe()
    }
}

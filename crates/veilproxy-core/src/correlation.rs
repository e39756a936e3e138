//! Process-wide correlation identifiers.
//!
//! Every command issued through the Control or Devices surface carries a
//! [`CorrelationId`]. The daemon core echoes it back in the matching
//! response so clients can pair the two.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Handle linking an issued command to its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl CorrelationId {
    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Monotonic id generator shared by all surfaces.
///
/// Cloning yields another handle to the same counter, so ids handed out
/// by the Control and Devices surfaces never collide. The first id is `0`.
#[derive(Debug, Clone, Default)]
pub struct CorrelationCounter {
    next: Arc<AtomicU64>,
}

impl CorrelationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id.
    pub fn next(&self) -> CorrelationId {
        // fetch_add is a single RMW on one location; Relaxed keeps it totally
        // ordered with respect to every other increment.
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> CorrelationId {
        CorrelationId(self.next.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_starts_at_zero() {
        let counter = CorrelationCounter::new();
        assert_eq!(counter.next(), CorrelationId(0));
        assert_eq!(counter.next(), CorrelationId(1));
        assert_eq!(counter.peek(), CorrelationId(2));
    }

    #[test]
    fn test_clones_share_state() {
        let a = CorrelationCounter::new();
        let b = a.clone();
        assert_eq!(a.next(), CorrelationId(0));
        assert_eq!(b.next(), CorrelationId(1));
        assert_eq!(a.next(), CorrelationId(2));
    }

    #[test]
    fn test_concurrent_ids_are_distinct() {
        let counter = CorrelationCounter::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let ids: Vec<_> = (0..500).map(|_| counter.next()).collect();
                    // Increasing within each thread
                    assert!(ids.windows(2).all(|w| w[0] < w[1]));
                    ids
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(all.len(), 4000);
        assert_eq!(counter.peek(), CorrelationId(4000));
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&CorrelationId(7)).unwrap();
        assert_eq!(json, "7");
    }
}

//! One-shot deadline scheduling.
//!
//! All domain deadlines (grace expiry, challenge expiry, next-challenge
//! fire) go through a single priority queue of `(deadline, version,
//! kind)` entries, drained once per tick by `poll`. Re-arming or
//! cancelling a kind bumps its version; entries still in the heap with
//! an older version are stale and dropped silently when popped. That is
//! the only race guard needed: state transitions re-arm, they never
//! chase heap entries.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

use chrono::{DateTime, Utc};

/// Single-owner deadline queue keyed by a timer kind.
#[derive(Debug, Clone)]
pub struct DeadlineScheduler<K: Copy + Eq + Hash + Ord> {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64, K)>>,
    /// Currently armed deadline per kind, with its version.
    armed: HashMap<K, (u64, DateTime<Utc>)>,
    next_version: u64,
}

impl<K: Copy + Eq + Hash + Ord> Default for DeadlineScheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash + Ord> DeadlineScheduler<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            armed: HashMap::new(),
            next_version: 0,
        }
    }

    /// Arm (or re-arm) a deadline for `kind`, invalidating any previous
    /// entry of the same kind.
    pub fn arm(&mut self, kind: K, deadline: DateTime<Utc>) {
        self.next_version += 1;
        self.armed.insert(kind, (self.next_version, deadline));
        self.heap.push(Reverse((deadline, self.next_version, kind)));
    }

    /// Disarm `kind`. The heap entry stays behind as a stale version
    /// and is discarded on pop.
    pub fn cancel(&mut self, kind: K) {
        self.armed.remove(&kind);
    }

    pub fn is_armed(&self, kind: K) -> bool {
        self.armed.contains_key(&kind)
    }

    pub fn deadline(&self, kind: K) -> Option<DateTime<Utc>> {
        self.armed.get(&kind).map(|(_, deadline)| *deadline)
    }

    /// Pop every due, still-current deadline. Stale entries (version
    /// superseded by a later arm or a cancel) are dropped without
    /// firing.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<K> {
        let mut fired = Vec::new();
        while let Some(Reverse((deadline, version, kind))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            if self.armed.get(&kind) == Some(&(version, deadline)) {
                self.armed.remove(&kind);
                fired.push(kind);
            }
        }
        fired
    }

    /// Cancel everything (session teardown).
    pub fn clear(&mut self) {
        self.heap.clear();
        self.armed.clear();
    }
}

//! Expiry Queue Module
//!
//! Min-heap of pending expirations, drained by the periodic sweep.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Pending expirations ordered by deadline.
///
/// Records are never removed on overwrite or delete; each carries the write
/// generation it was scheduled for and the store discards it if the live
/// entry has moved on.
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, String)>>,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` (at `generation`) to expire at `deadline`.
    pub fn schedule(&mut self, key: &str, generation: u64, deadline: Instant) {
        self.heap
            .push(Reverse((deadline, generation, key.to_string())));
    }

    /// Pops every record whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Vec<(String, u64)> {
        let mut due = Vec::new();
        while let Some(Reverse((deadline, _, _))) = self.heap.peek() {
            if *deadline > now {
                break;
            }
            if let Some(Reverse((_, generation, key))) = self.heap.pop() {
                due.push((key, generation));
            }
        }
        due
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Rebuilds the heap keeping only records `live` accepts.
    pub fn retain<F>(&mut self, mut live: F)
    where
        F: FnMut(&str, u64) -> bool,
    {
        let records = std::mem::take(&mut self.heap).into_vec();
        self.heap = records
            .into_iter()
            .filter(|Reverse((_, generation, key))| live(key, *generation))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

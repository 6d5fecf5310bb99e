// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The timestamp-ordered priority queue (C4).

use crate::flags::Timestamp;
use crate::task::Task;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Entry {
    timestamp: Timestamp,
    /// Breaks timestamp ties by insertion order (§8, invariant 1).
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` is a max-heap; reverse so the smallest (ts, seq) sorts
        // to the top.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A min-heap of [`Task`]s keyed on timestamp, ties broken by insertion
/// order. `std::collections::BinaryHeap` wrapped in a `Reverse`-keyed
/// newtype, per §4.2.
#[derive(Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl PriorityQueue {
    #[must_use]
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new(), next_seq: 0 }
    }

    pub fn push(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { timestamp: task.timestamp(), seq, task });
    }

    pub fn pop_top(&mut self) -> Option<Task> {
        self.heap.pop().map(|entry| entry.task)
    }

    #[must_use]
    pub fn peek_min_ts(&self) -> Option<Timestamp> {
        self.heap.peek().map(|entry| entry.timestamp)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

/// A pluggable timestamp-ordered queue, so the TLS back-end's shared queue
/// could be swapped for a lock-free or sharded implementation without
/// touching the worker loop. This crate ships only the straightforward
/// `spin::Mutex`-guarded [`PriorityQueue`] baseline (§4.2, §9); correctness,
/// not scalability, is this exercise's target.
pub trait TimestampQueue: Send + Sync {
    fn push(&self, task: Task);
    fn pop_top(&self) -> Option<Task>;
    fn peek_min_ts(&self) -> Option<Timestamp>;
    fn is_empty(&self) -> bool;
}

impl TimestampQueue for spin::Mutex<PriorityQueue> {
    fn push(&self, task: Task) {
        self.lock().push(task);
    }

    fn pop_top(&self) -> Option<Task> {
        self.lock().pop_top()
    }

    fn peek_min_ts(&self) -> Option<Timestamp> {
        self.lock().peek_min_ts()
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Hint;

    fn task(ts: Timestamp) -> Task {
        Task::new(ts, Hint::none(), |_ctx| {})
    }

    #[test]
    fn pops_in_non_decreasing_timestamp_order() {
        let mut q = PriorityQueue::new();
        for ts in [3, 1, 2, 0] {
            q.push(task(ts));
        }
        let mut seen = Vec::new();
        while let Some(t) = q.pop_top() {
            seen.push(t.timestamp());
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut q = PriorityQueue::new();
        // distinguish ties via uid assignment order rather than payload,
        // since `Task` carries no inspectable body.
        q.push(task(5));
        q.push(task(5));
        q.push(task(5));
        assert_eq!(q.len(), 3);
        for _ in 0..3 {
            assert_eq!(q.pop_top().unwrap().timestamp(), 5);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn peek_min_ts_does_not_remove() {
        let mut q = PriorityQueue::new();
        q.push(task(10));
        q.push(task(4));
        assert_eq!(q.peek_min_ts(), Some(4));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn empty_queue_has_no_min() {
        let q = PriorityQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.peek_min_ts(), None);
    }
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The simulator boundary (C13).
//!
//! The hardware simulator — its register-based magic-op channel,
//! speculation and abort handling, conflict detection, and GVT protocol —
//! is out of this crate's scope (§1). [`SimBackend`] is the trait boundary
//! standing in for it; [`LocalSim`] is a trivial in-process implementation
//! that exists only so this crate is independently testable and benchable
//! without real simulator hardware.

use crate::flags::Timestamp;
use crate::spill::TaskDescriptor;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Operations the hardware back-end needs from the simulator's magic-op
/// channel (§6).
pub trait SimBackend: Send + Sync {
    /// Hands a descriptor to the hardware task queue. Returns the
    /// descriptor back on failure (queue full).
    fn enqueue_hw(&self, descriptor: TaskDescriptor) -> Result<(), TaskDescriptor>;
    /// Removes and returns the oldest untied task, or `None` if none are
    /// eligible for eviction.
    fn remove_oldest_task(&self) -> Option<TaskDescriptor>;
    /// Current depth of the hardware task queue.
    fn task_queue_len(&self) -> usize;
    /// Advances global virtual time.
    fn set_gvt(&self, timestamp: Timestamp);
    /// Reads the current global virtual time.
    fn gvt(&self) -> Timestamp;
    /// Marks the currently running task as aborted.
    fn record_as_aborted(&self);
    /// Clears the currently running task's speculative read set.
    fn clear_read_set(&self);
}

/// An in-process stand-in for the simulator's hardware task queue, used by
/// this crate's own tests and benches. Backed by a plain `Mutex<VecDeque<_>>`
/// — there is no speculation or conflict detection here, only the bulk
/// enqueue/evict shape the spill protocol (C9) needs to exercise.
pub struct LocalSim {
    queue: Mutex<VecDeque<TaskDescriptor>>,
    high_water: usize,
    gvt: AtomicU64,
}

impl LocalSim {
    #[must_use]
    pub fn new(high_water: usize) -> Self {
        Self { queue: Mutex::new(VecDeque::new()), high_water, gvt: AtomicU64::new(0) }
    }

    /// `true` once `task_queue_len` has crossed the configured high-water
    /// mark, the spiller's trigger condition (§4.6).
    #[must_use]
    pub fn is_over_high_water(&self) -> bool {
        self.task_queue_len() > self.high_water
    }
}

impl SimBackend for LocalSim {
    fn enqueue_hw(&self, descriptor: TaskDescriptor) -> Result<(), TaskDescriptor> {
        self.queue.lock().expect("LocalSim queue lock poisoned").push_back(descriptor);
        Ok(())
    }

    fn remove_oldest_task(&self) -> Option<TaskDescriptor> {
        self.queue.lock().expect("LocalSim queue lock poisoned").pop_front()
    }

    fn task_queue_len(&self) -> usize {
        self.queue.lock().expect("LocalSim queue lock poisoned").len()
    }

    fn set_gvt(&self, timestamp: Timestamp) {
        self.gvt.store(timestamp, Ordering::Release);
    }

    fn gvt(&self) -> Timestamp {
        self.gvt.load(Ordering::Acquire)
    }

    fn record_as_aborted(&self) {
        tracing::trace!("LocalSim::record_as_aborted (stub)");
    }

    fn clear_read_set(&self) {
        tracing::trace!("LocalSim::clear_read_set (stub)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{EnqFlags, Hint};
    use crate::spill::{DescriptorArgs, TaskDescriptor};

    fn noop(_ctx: &dyn crate::task::Context, _ts: Timestamp, _hint: Hint, _args: DescriptorArgs) {}

    #[test]
    fn evicts_in_fifo_order() {
        let sim = LocalSim::new(4);
        for ts in [1, 2, 3] {
            sim.enqueue_hw(TaskDescriptor::new(ts, noop, EnqFlags::empty(), Hint::none(), DescriptorArgs::new()))
                .unwrap();
        }
        assert_eq!(sim.remove_oldest_task().unwrap().timestamp, 1);
        assert_eq!(sim.remove_oldest_task().unwrap().timestamp, 2);
        assert_eq!(sim.task_queue_len(), 1);
    }

    #[test]
    fn high_water_mark_trips_once_exceeded() {
        let sim = LocalSim::new(1);
        assert!(!sim.is_over_high_water());
        sim.enqueue_hw(TaskDescriptor::new(0, noop, EnqFlags::empty(), Hint::none(), DescriptorArgs::new()))
            .unwrap();
        assert!(!sim.is_over_high_water());
        sim.enqueue_hw(TaskDescriptor::new(0, noop, EnqFlags::empty(), Hint::none(), DescriptorArgs::new()))
            .unwrap();
        assert!(sim.is_over_high_water());
    }
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The sequential back-end (C6): a single-worker loop with no fractal-time
//! support (§4.3).

use super::{Schedule, Tick};
use crate::flags::{NO_TIMESTAMP, Timestamp};
use crate::queue::PriorityQueue;
use crate::task::{Context, Task};
use std::cell::{Cell, RefCell};

/// Runs tasks one at a time, in timestamp order, on the calling thread.
pub struct SequentialRuntime {
    queue: RefCell<PriorityQueue>,
    current_timestamp: Cell<Timestamp>,
}

impl SequentialRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self { queue: RefCell::new(PriorityQueue::new()), current_timestamp: Cell::new(NO_TIMESTAMP) }
    }

    pub fn enqueue(&self, task: Task) {
        self.queue.borrow_mut().push(task);
    }

    /// Runs until the queue is empty.
    pub fn run(&self) {
        Schedule::run(self);
    }
}

impl Schedule for SequentialRuntime {
    fn tick_n(&self, n: usize) -> Tick {
        let mut tick = Tick::default();
        while tick.polled < n {
            let Some(task) = self.queue.borrow_mut().pop_top() else { break };
            self.current_timestamp.set(task.timestamp());
            task.run(self);
            tick.polled += 1;
        }
        self.current_timestamp.set(NO_TIMESTAMP);
        tick.has_remaining = !self.queue.borrow().is_empty();
        tick
    }
}

impl Default for SequentialRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for SequentialRuntime {
    fn timestamp(&self) -> Timestamp {
        self.current_timestamp.get()
    }

    fn super_timestamp(&self) -> Timestamp {
        NO_TIMESTAMP
    }

    fn tid(&self) -> usize {
        0
    }

    fn num_threads(&self) -> usize {
        1
    }

    fn enqueue(&self, task: Task) {
        self.queue.borrow_mut().push(task);
    }

    fn deepen(&self, _max_timestamp: Timestamp) {
        unimplemented!("sequential backend does not support fractal time domains")
    }

    fn undeepen(&self) {
        unimplemented!("sequential backend does not support fractal time domains")
    }

    fn set_gvt(&self, _timestamp: Timestamp) {}

    fn serialize(&self) {}

    fn clear_read_set(&self) {}

    fn record_as_aborted(&self) {
        panic!("sequential backend runs non-speculatively; record_as_aborted is unreachable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Hint;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_tasks_in_timestamp_order() {
        let rt = SequentialRuntime::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for ts in [3, 1, 2, 0] {
            let order = Arc::clone(&order);
            rt.enqueue(Task::new(ts, Hint::none(), move |_ctx| {
                order.lock().unwrap().push(ts);
            }));
        }
        rt.run();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn task_observes_its_own_timestamp() {
        let rt = SequentialRuntime::new();
        let observed = Arc::new(Mutex::new(None));
        let observed2 = Arc::clone(&observed);
        rt.enqueue(Task::new(42, Hint::none(), move |ctx| {
            *observed2.lock().unwrap() = Some(ctx.timestamp());
        }));
        rt.run();
        assert_eq!(*observed.lock().unwrap(), Some(42));
    }

    #[test]
    fn tasks_can_enqueue_more_tasks() {
        let rt = SequentialRuntime::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let order2 = Arc::clone(&order);
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            order2.lock().unwrap().push(0);
            ctx.enqueue(Task::new(1, Hint::none(), |_ctx| {}));
        }));
        rt.run();
        assert_eq!(*order.lock().unwrap(), vec![0]);
    }

    #[test]
    #[should_panic(expected = "does not support fractal time domains")]
    fn deepen_is_unimplemented() {
        let rt = SequentialRuntime::new();
        rt.enqueue(Task::new(0, Hint::none(), |ctx| ctx.deepen(u64::MAX)));
        rt.run();
    }
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The task record (C3) and the [`Context`] surface a running task sees.

use crate::flags::{Hint, Timestamp};
use crate::id::Uid;
use std::fmt;

/// The interface a task body sees while it runs. Each back-end provides its
/// own implementation; tasks are generic over it only through `&dyn
/// Context`, so the same closure can run unmodified on any back-end that
/// supports the operations it calls.
pub trait Context {
    /// The timestamp of the task currently running on this worker, or
    /// [`crate::NO_TIMESTAMP`] outside of a task.
    fn timestamp(&self) -> Timestamp;
    /// The super-timestamp of the current virtual-time domain.
    fn super_timestamp(&self) -> Timestamp;
    /// This worker's index, in `[0, num_threads())`.
    fn tid(&self) -> usize;
    /// The number of worker threads in this runtime.
    fn num_threads(&self) -> usize;
    /// Enqueue a task for later dispatch, honouring any `EnqFlags` carried
    /// in its hint.
    fn enqueue(&self, task: Task);
    /// Open a new virtual-time domain (fractal time). Not every back-end
    /// implements this; see each back-end's module docs.
    fn deepen(&self, max_timestamp: Timestamp);
    /// Close the innermost virtual-time domain. Panics if it is non-empty.
    fn undeepen(&self);
    /// Forward a GVT update to the simulator backend.
    fn set_gvt(&self, timestamp: Timestamp);
    /// Mark the current task's state as serialized (speculation control).
    fn serialize(&self);
    /// Clear the current task's speculative read set.
    fn clear_read_set(&self);
    /// Mark the current task as aborted (speculation control).
    fn record_as_aborted(&self);
}

/// A single unit of work: an immutable `{timestamp, uid, hint, body}`
/// record, constructed by `enqueue`, invoked exactly once by a worker, then
/// dropped. Never mutated after construction other than the one-time `uid`
/// assignment performed by the oracle back-end.
pub struct Task {
    timestamp: Timestamp,
    uid: Option<Uid>,
    hint: Hint,
    body: Box<dyn FnOnce(&dyn Context) + Send>,
}

impl Task {
    /// Construct a task from a closure taking the [`Context`] it will run
    /// under. Most callers go through [`crate::args::enqueue_body`] instead,
    /// which also threads the timestamp and argument tuple into the
    /// closure's signature.
    pub fn new(
        timestamp: Timestamp,
        hint: Hint,
        body: impl FnOnce(&dyn Context) + Send + 'static,
    ) -> Self {
        Self { timestamp, uid: None, hint, body: Box::new(body) }
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[must_use]
    pub fn hint(&self) -> Hint {
        self.hint
    }

    #[must_use]
    pub fn uid(&self) -> Option<Uid> {
        self.uid
    }

    /// Assigns this task a fresh [`Uid`], per the oracle back-end's per-task
    /// UID tracking (§4.4). Idempotent only in the sense that calling it
    /// twice burns two ids; back-ends call it at most once per task.
    pub(crate) fn assign_uid(&mut self) -> Uid {
        let uid = Uid::next();
        self.uid = Some(uid);
        uid
    }

    /// Consumes and runs this task's body under the given context.
    pub(crate) fn run(self, ctx: &dyn Context) {
        (self.body)(ctx);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("timestamp", &self.timestamp)
            .field("uid", &self.uid)
            .field("hint", &self.hint)
            .finish_non_exhaustive()
    }
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The spill / requeue protocol (C9).
//!
//! When the hardware task buffer is over-full, a spiller evicts the oldest
//! untied tasks into a heap-resident [`TaskDescriptors`] block and enqueues
//! a single requeuer task that reinstates them later, last-in-first-out
//! (§4.6, §9).

use crate::flags::{EnqFlags, Hint, Timestamp, NO_TIMESTAMP, PLS_APP_MAX_ARGS};
use crate::sim::SimBackend;
use crate::task::{Context, Task};
use arrayvec::ArrayVec;
use mycelium_bitfield::bitfield;

/// The args a spilled descriptor carries: up to [`PLS_APP_MAX_ARGS`] scalars,
/// stored inline with no heap allocation (§3).
pub type DescriptorArgs = ArrayVec<u64, PLS_APP_MAX_ARGS>;

/// A plain function pointer callable from a re-expanded [`TaskDescriptor`].
///
/// Only fn-pointer tasks — the scalar/inline-tuple marshalling paths (§4.1)
/// — are spill-eligible: a fat `Box<dyn FnOnce>` pointer can't be
/// losslessly packed into the 48-bit slot §3 reserves for a function
/// pointer, so descriptor-backed tasks are restricted to plain `fn` items
/// with a POD argument array.
pub type SpillableFn = fn(&dyn Context, Timestamp, Hint, DescriptorArgs);

bitfield! {
    /// `taskPtrAndFlags`: the persistent flag bits packed into the low 16
    /// bits, the function pointer in the remaining 48 (§3).
    #[derive(PartialEq, Eq)]
    struct TaskPtrAndFlags<u64> {
        const FLAGS: u16;
        const TASK_PTR = ..;
    }
}

/// A heap-resident spill record: `{timestamp, taskPtrAndFlags, hint,
/// args[N]}` (§3).
pub struct TaskDescriptor {
    pub timestamp: Timestamp,
    ptr_and_flags: TaskPtrAndFlags,
    pub hint: Hint,
    pub args: DescriptorArgs,
}

impl TaskDescriptor {
    pub fn new(
        timestamp: Timestamp,
        task: SpillableFn,
        flags: EnqFlags,
        hint: Hint,
        args: DescriptorArgs,
    ) -> Self {
        let ptr_and_flags = TaskPtrAndFlags::new()
            .with(TaskPtrAndFlags::FLAGS, flags.persistent().bits() as u16)
            .with(TaskPtrAndFlags::TASK_PTR, task as usize as u64);
        Self { timestamp, ptr_and_flags, hint, args }
    }

    #[must_use]
    pub fn flags(&self) -> EnqFlags {
        EnqFlags::from_bits_truncate(u32::from(self.ptr_and_flags.get(TaskPtrAndFlags::FLAGS)))
    }

    #[must_use]
    pub fn task(&self) -> SpillableFn {
        let addr = self.ptr_and_flags.get(TaskPtrAndFlags::TASK_PTR) as usize;
        // Safety: every `TaskDescriptor` this crate constructs packs `addr`
        // from a real `SpillableFn` value in `new`; the round trip through
        // the bitfield can't carry that proof in the type system.
        unsafe { std::mem::transmute::<usize, SpillableFn>(addr) }
    }
}

/// A size-prefixed block of evicted descriptors, owned exclusively by its
/// requeuer until re-expanded (§3).
pub type TaskDescriptors = Vec<TaskDescriptor>;

/// Evicts up to `n` untied tasks from `sim` into a heap-resident block and
/// returns the requeuer [`Task`] that will reinstate them. Returns `None` if
/// zero tasks were extracted — a spiller that extracts nothing does not
/// create a requeuer, or it would trivially recurse (§4.6).
///
/// `frame` selects the frame-spiller variant: its requeuer is forced
/// `CANTSPEC` and carries the sentinel timestamp [`NO_TIMESTAMP`] rather
/// than the minimum timestamp among evicted tasks.
pub fn spill(sim: &dyn SimBackend, n: usize, frame: bool) -> Option<Task> {
    let mut block: TaskDescriptors = Vec::with_capacity(n);
    let mut min_ts = Timestamp::MAX;
    let mut requeuer_flags = EnqFlags::NOTIMESTAMP | EnqFlags::CANTSPEC;

    for _ in 0..n {
        let Some(descriptor) = sim.remove_oldest_task() else { break };
        requeuer_flags &= descriptor.flags();
        min_ts = min_ts.min(descriptor.timestamp);
        block.push(descriptor);
    }

    if block.is_empty() {
        tracing::trace!("spiller extracted zero tasks; no requeuer enqueued");
        return None;
    }

    let base = EnqFlags::SAMEHINT
        | EnqFlags::NONSERIALHINT
        | EnqFlags::NOHASH
        | EnqFlags::PRODUCER
        | EnqFlags::REQUEUER;
    let flags = if frame {
        base | requeuer_flags.persistent() | EnqFlags::CANTSPEC
    } else {
        base | requeuer_flags.persistent()
    };
    let ts = if frame { NO_TIMESTAMP } else { min_ts };

    tracing::debug!(extracted = block.len(), ts, frame, "spilled tasks into descriptor block");

    Some(requeuer_task(ts, Hint::new(0, flags), block))
}

fn requeuer_task(timestamp: Timestamp, hint: Hint, block: TaskDescriptors) -> Task {
    let mut block = block;
    Task::new(timestamp, hint, move |ctx| requeue(&mut block, ctx))
}

/// Reinstates a spilled descriptor block, iterating last-in-first-out
/// (§4.6, §9 "Requeuer LIFO iteration"). Persistent flags are re-applied
/// per descriptor; transient flags are re-derived from the descriptor's own
/// record, since the requeuer never carried them in the first place.
fn requeue(block: &mut TaskDescriptors, ctx: &dyn Context) {
    while let Some(descriptor) = block.pop() {
        let f = descriptor.task();
        let flags = descriptor.flags();
        let hint = Hint::new(descriptor.hint.hint, flags);
        let args = descriptor.args;
        let ts = descriptor.timestamp;
        ctx.enqueue(Task::new(ts, hint, move |ctx| f(ctx, ts, hint, args)));
    }
}

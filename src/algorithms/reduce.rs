// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `reduce` (part of C11, §4.8).
//!
//! A [`Reducer`] control block holds one intermediate per worker; each
//! block task folds its slice into the caller's worker-private slot, and
//! the last block to finish spawns a `collapse` task that folds the
//! per-worker intermediates together (manually unrolled by 4 for
//! instruction-level parallelism) before handing the final value to the
//! caller's callback.
//!
//! Wrapping the whole reduction in a `deepen`ed sub-domain would make it
//! appear atomic to the caller, but only the oracle back-end implements
//! fractal time (§9's open question); since `reduce` must also work on the
//! sequential and TLS back-ends, this gates the collapse step on an
//! explicit pending-block counter instead, which gives the same "callback
//! only fires after every block has contributed" guarantee without relying
//! on a back-end-specific domain stack. See `DESIGN.md`.

use super::choose_grain_elems;
use super::send_ptr::SendPtr;
use crate::backend::RuntimeConfig;
use crate::flags::{Hint, Timestamp};
use crate::task::{Context, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Reducer<R, Op> {
    op: Op,
    identity: R,
    slots: Vec<spin::Mutex<Option<R>>>,
    pending: AtomicUsize,
    callback: spin::Mutex<Option<Box<dyn FnOnce(&dyn Context, R) + Send>>>,
    ts: Timestamp,
}

impl<R, Op> Reducer<R, Op>
where
    R: Clone + Send + 'static,
    Op: Fn(R, R) -> R,
{
    fn update(&self, tid: usize, value: R) {
        let mut slot = self.slots[tid].lock();
        *slot = Some(match slot.take() {
            Some(acc) => (self.op)(acc, value),
            None => value,
        });
    }

    fn collapse(&self) -> R {
        let mut acc = self.identity.clone();
        let mut i = 0;
        // Unrolled by 4 for instruction-level parallelism (§4.8); the tail
        // loop mops up whatever's left over.
        while i + 4 <= self.slots.len() {
            for slot in &self.slots[i..i + 4] {
                if let Some(v) = slot.lock().take() {
                    acc = (self.op)(acc, v);
                }
            }
            i += 4;
        }
        for slot in &self.slots[i..] {
            if let Some(v) = slot.lock().take() {
                acc = (self.op)(acc, v);
            }
        }
        acc
    }

    fn block_done(&self, ctx: &dyn Context) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let final_value = self.collapse();
        let callback = self.callback.lock().take().expect("collapse runs exactly once");
        ctx.enqueue(Task::new(self.ts, Hint::none(), move |ctx| callback(ctx, final_value)));
    }
}

unsafe fn serial_fold<R, Op>(ptr: *const R, len: usize, identity: &R, op: &Op) -> R
where
    R: Clone,
    Op: Fn(R, R) -> R,
{
    let mut acc = identity.clone();
    for i in 0..len {
        // Safety: forwarded from `reduce`'s caller-upheld contract.
        let item = unsafe { (*ptr.add(i)).clone() };
        acc = op(acc, item);
    }
    acc
}

/// Folds `op` over `ptr[0..len)` starting from `identity`, splitting the
/// range into per-worker blocks, and hands the result to `callback` once
/// every block has contributed. `op` must be associative; block order (and
/// therefore the exact association applied) is not guaranteed, so `op`
/// should also be commutative unless the caller doesn't care which valid
/// parenthesisation it gets (§8, testable property 5).
///
/// With `len == 0`, `callback` is invoked with `identity` directly.
///
/// # Safety
/// `ptr` must be valid to read for `len` elements of `R`, and nothing may
/// write through `ptr[0..len)` until `callback` runs; see [`super::fill`]'s
/// safety note about lifetime across back-ends.
pub unsafe fn reduce<R, Op, F>(
    ctx: &dyn Context,
    ptr: *const R,
    len: usize,
    identity: R,
    op: Op,
    ts: Timestamp,
    cfg: &RuntimeConfig,
    callback: F,
) where
    R: Clone + Send + 'static,
    Op: Fn(R, R) -> R + Clone + Send + Sync + 'static,
    F: FnOnce(&dyn Context, R) + Send + 'static,
{
    if len == 0 {
        ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| callback(ctx, identity)));
        return;
    }

    let grain = choose_grain_elems::<R>(len, cfg.workers);
    let num_blocks = len.div_ceil(grain);

    let reducer = Arc::new(Reducer {
        op,
        identity,
        slots: (0..cfg.workers.max(1)).map(|_| spin::Mutex::new(None)).collect(),
        pending: AtomicUsize::new(num_blocks),
        callback: spin::Mutex::new(Some(Box::new(callback))),
        ts,
    });

    let mut start = 0;
    while start < len {
        let end = (start + grain).min(len);
        // Safety: `start < end <= len`, within the region the caller
        // guarantees `ptr` is valid for.
        let block_ptr = SendPtr(unsafe { ptr.add(start) } as *mut R);
        let block_len = end - start;
        let reducer = Arc::clone(&reducer);

        ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| {
            let tid = ctx.tid().min(reducer.slots.len() - 1);
            // Safety: forwarded from `reduce`'s caller-upheld contract.
            let value = unsafe { serial_fold(block_ptr.0 as *const R, block_len, &reducer.identity, &reducer.op) };
            reducer.update(tid, value);
            reducer.block_done(ctx);
        }));

        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SequentialRuntime;
    use std::sync::{Arc as StdArc, Mutex};

    #[test]
    fn sums_every_element() {
        let rt = SequentialRuntime::new();
        let data: Vec<u64> = (1..=5u64).collect();
        let ptr = data.as_ptr();
        let len = data.len();
        let result = StdArc::new(Mutex::new(None));
        let result2 = StdArc::clone(&result);
        let cfg = RuntimeConfig::new().workers(4);
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            // Safety: `data` outlives `rt.run()`.
            unsafe {
                reduce(ctx, ptr, len, 0u64, |a, b| a + b, 10, &cfg, move |ctx, total| {
                    assert_eq!(ctx.timestamp(), 10);
                    *result2.lock().unwrap() = Some(total);
                });
            }
        }));
        rt.run();
        assert_eq!(*result.lock().unwrap(), Some(15));
    }

    #[test]
    fn empty_range_calls_back_with_identity() {
        let rt = SequentialRuntime::new();
        let data: Vec<u64> = Vec::new();
        let ptr = data.as_ptr();
        let result = StdArc::new(Mutex::new(None));
        let result2 = StdArc::clone(&result);
        let cfg = RuntimeConfig::new();
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| unsafe {
            reduce(ctx, ptr, 0, 42u64, |a, b| a + b, 0, &cfg, move |_ctx, total| {
                *result2.lock().unwrap() = Some(total);
            });
        }));
        rt.run();
        assert_eq!(*result.lock().unwrap(), Some(42));
    }

    #[test]
    fn single_block_reduces_without_spawning_extra_tasks() {
        let rt = SequentialRuntime::new();
        let data = [10u64];
        let ptr = data.as_ptr();
        let result = StdArc::new(Mutex::new(None));
        let result2 = StdArc::clone(&result);
        let cfg = RuntimeConfig::new().workers(1);
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| unsafe {
            reduce(ctx, ptr, 1, 0u64, |a, b| a + b, 0, &cfg, move |_ctx, total| {
                *result2.lock().unwrap() = Some(total);
            });
        }));
        rt.run();
        assert_eq!(*result.lock().unwrap(), Some(10));
    }
}

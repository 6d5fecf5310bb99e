// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `forall_red` (C12, §4.9): `forall` crossed with [`crate::algorithms::reduce`] —
//! a variable-radix reduction tree over `[first, last)` where the leaves run
//! the caller's per-index `body` instead of folding pre-existing data.
//!
//! Each interior node splits its range into up to `MAX_RADIX` children,
//! mirroring [`crate::enqueue_all`]'s tree fanout. A leaf (range no larger
//! than `cfg.max_base_enqs`) folds `body` serially and reports its partial
//! straight to its parent; a node collapses its children's partials with
//! `op` once every child has reported, then reports its own partial up one
//! level. The root's collapse is the caller's `callback`.

use crate::backend::RuntimeConfig;
use crate::flags::{Hint, Timestamp};
use crate::task::{Context, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const MAX_RADIX: usize = 8;

fn choose_radix(len: usize, base: usize) -> usize {
    let leaves = len.div_ceil(base.max(1));
    leaves.clamp(2, MAX_RADIX)
}

struct Node<R, Op> {
    op: Arc<Op>,
    identity: R,
    slots: Vec<spin::Mutex<Option<R>>>,
    pending: AtomicUsize,
    report: spin::Mutex<Option<Box<dyn FnOnce(&dyn Context, R) + Send>>>,
}

impl<R, Op> Node<R, Op>
where
    R: Clone + Send + 'static,
    Op: Fn(R, R) -> R,
{
    fn child_done(&self, ctx: &dyn Context, slot: usize, value: R) {
        *self.slots[slot].lock() = Some(value);
        if self.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let mut acc = self.identity.clone();
        for slot in &self.slots {
            if let Some(v) = slot.lock().take() {
                acc = (*self.op)(acc, v);
            }
        }
        let report = self.report.lock().take().expect("collapse runs exactly once");
        report(ctx, acc);
    }
}

#[allow(clippy::too_many_arguments)]
fn forall_red_node<F, Op, R>(
    ctx: &dyn Context,
    ts: Timestamp,
    first: usize,
    last: usize,
    identity: R,
    op: Arc<Op>,
    base: usize,
    body: Arc<F>,
    report: Box<dyn FnOnce(&dyn Context, R) + Send>,
) where
    F: Fn(&dyn Context, Timestamp, usize) -> R + Send + Sync + 'static,
    Op: Fn(R, R) -> R + Send + Sync + 'static,
    R: Clone + Send + 'static,
{
    let len = last - first;
    if len <= base {
        let mut acc = identity;
        for i in first..last {
            acc = (*op)(acc, (*body)(ctx, ts, i));
        }
        report(ctx, acc);
        return;
    }

    let radix = choose_radix(len, base).min(len);
    let chunk = len.div_ceil(radix);

    let mut ranges = Vec::with_capacity(radix);
    let mut start = first;
    while start < last {
        let end = (start + chunk).min(last);
        ranges.push((start, end));
        start = end;
    }

    let node = Arc::new(Node {
        op: Arc::clone(&op),
        identity: identity.clone(),
        slots: (0..ranges.len()).map(|_| spin::Mutex::new(None)).collect(),
        pending: AtomicUsize::new(ranges.len()),
        report: spin::Mutex::new(Some(report)),
    });

    for (slot, (child_first, child_last)) in ranges.into_iter().enumerate() {
        let op = Arc::clone(&op);
        let body = Arc::clone(&body);
        let identity = identity.clone();
        let node = Arc::clone(&node);
        ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| {
            let node_for_report = Arc::clone(&node);
            let child_report: Box<dyn FnOnce(&dyn Context, R) + Send> =
                Box::new(move |ctx, value| node_for_report.child_done(ctx, slot, value));
            forall_red_node(ctx, ts, child_first, child_last, identity, op, base, body, child_report);
        }));
    }
}

/// Folds `body(ctx, ts, i)` over every `i` in `[first, last)` through `op`,
/// starting from `identity`, and hands the final value to `callback`. Like
/// [`crate::algorithms::reduce`], `op` must be associative and (since block
/// order isn't guaranteed) should be commutative too unless the caller
/// doesn't care which valid parenthesisation it gets.
///
/// With `first >= last`, `callback` is invoked with `identity` directly.
pub fn forall_red<F, Op, R, C>(
    ctx: &dyn Context,
    ts: Timestamp,
    first: usize,
    last: usize,
    cfg: &RuntimeConfig,
    identity: R,
    op: Op,
    body: F,
    callback: C,
) where
    F: Fn(&dyn Context, Timestamp, usize) -> R + Send + Sync + 'static,
    Op: Fn(R, R) -> R + Send + Sync + 'static,
    R: Clone + Send + 'static,
    C: FnOnce(&dyn Context, R) + Send + 'static,
{
    if last <= first {
        ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| callback(ctx, identity)));
        return;
    }
    let base = cfg.max_base_enqs.max(1);
    forall_red_node(ctx, ts, first, last, identity, Arc::new(op), base, Arc::new(body), Box::new(callback));
}

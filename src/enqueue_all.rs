// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The enqueue-all engines (C10): tree fanout, timestamp-lambda tree,
//! bounded strand, and progressive-expansion variants for enqueuing a
//! random-access slice of items (§4.7).
//!
//! All four share one shape: a small recursive/chaining closure re-enqueues
//! itself (or its children) as a `Task` until the whole slice has been
//! handed, one item at a time, to the caller's `enq` lambda. The slice is
//! held behind an `Arc<[T]>` so every spawned task can carry its own
//! reference without copying the data; see [`crate::algorithms`] for the
//! re-exports callers actually use.

use crate::backend::RuntimeConfig;
use crate::flags::{EnqFlags, Hint, Timestamp};
use crate::task::{Context, Task};
use std::sync::Arc;

/// `k ∈ {2, 4, 8}`, chosen from the remaining slice length per §4.7's
/// thresholds against this fixed upper bound on fanout.
const MAX_CHILDREN: usize = 8;

fn choose_fanout(len: usize) -> usize {
    if len > MAX_CHILDREN * MAX_CHILDREN / 2 {
        MAX_CHILDREN
    } else if len > MAX_CHILDREN * MAX_CHILDREN / 4 {
        MAX_CHILDREN / 2
    } else {
        2
    }
}

/// Replaces `NOHINT` with `SAMEHINT` on the left-most child so it stays on
/// the parent's tile rather than taking an off-tile hop (§4.7).
fn leftmost_child_hint(hint: Hint) -> Hint {
    if hint.flags.contains(EnqFlags::NOHINT) {
        Hint::new(hint.hint, (hint.flags - EnqFlags::NOHINT) | EnqFlags::SAMEHINT)
    } else {
        hint
    }
}

/// Recursively fans a `[start, end)` sub-range of `items` out into up to
/// `MAX_CHILDREN` child enqueuer tasks, bottoming out at `enq` calls once a
/// sub-range is no larger than `cfg.max_base_enqs`.
///
/// `tsfn`, when given, recomputes each child's timestamp from its
/// sub-range's first item (the timestamp-lambda variant); `None` keeps the
/// whole tree at the caller's `ts` (the plain tree variant).
fn enqueue_all_tree_inner<T, F>(
    ctx: &dyn Context,
    items: Arc<[T]>,
    start: usize,
    end: usize,
    ts: Timestamp,
    hint: Hint,
    cfg: RuntimeConfig,
    enq: F,
    tsfn: Option<Arc<dyn Fn(&T) -> Timestamp + Send + Sync>>,
) where
    T: Send + Sync + 'static,
    F: Fn(&dyn Context, Timestamp, &T) + Clone + Send + Sync + 'static,
{
    let len = end - start;
    if len == 0 {
        return;
    }
    if len <= cfg.max_base_enqs {
        for i in start..end {
            enq(ctx, ts, &items[i]);
        }
        return;
    }

    let k = choose_fanout(len).min(len);
    let chunk = len.div_ceil(k);
    for child_idx in 0..k {
        let child_start = start + child_idx * chunk;
        if child_start >= end {
            break;
        }
        let child_end = (child_start + chunk).min(end);

        let child_hint = if child_idx == 0 { leftmost_child_hint(hint) } else { hint };
        let child_ts = match &tsfn {
            Some(f) => f(&items[child_start]),
            None => ts,
        };

        let items = Arc::clone(&items);
        let enq = enq.clone();
        let cfg = cfg.clone();
        let tsfn = tsfn.clone();
        ctx.enqueue(Task::new(child_ts, child_hint, move |ctx| {
            enqueue_all_tree_inner(ctx, items, child_start, child_end, child_ts, child_hint, cfg, enq, tsfn);
        }));
    }
}

/// Tree variant (§4.7): recursively fans `items` out at a uniform
/// timestamp, bottoming out in serial `enq` calls once a sub-range is no
/// larger than `cfg.max_base_enqs`.
pub fn enqueue_all<T, F>(ctx: &dyn Context, items: Arc<[T]>, ts: Timestamp, hint: Hint, cfg: &RuntimeConfig, enq: F)
where
    T: Send + Sync + 'static,
    F: Fn(&dyn Context, Timestamp, &T) + Clone + Send + Sync + 'static,
{
    let end = items.len();
    enqueue_all_tree_inner(ctx, items, 0, end, ts, hint, cfg.clone(), enq, None);
}

/// Timestamp-lambda variant (§4.7): each sub-range's child enqueuer takes
/// `tsfn(first_of_subrange)` as its own timestamp rather than inheriting
/// the caller's. Presumes `tsfn` is non-decreasing along `items`.
pub fn enqueue_all_ts<T, F, TF>(
    ctx: &dyn Context,
    items: Arc<[T]>,
    hint: Hint,
    cfg: &RuntimeConfig,
    tsfn: TF,
    enq: F,
) where
    T: Send + Sync + 'static,
    F: Fn(&dyn Context, Timestamp, &T) + Clone + Send + Sync + 'static,
    TF: Fn(&T) -> Timestamp + Send + Sync + 'static,
{
    if items.is_empty() {
        return;
    }
    let ts = tsfn(&items[0]);
    let end = items.len();
    let tsfn: Arc<dyn Fn(&T) -> Timestamp + Send + Sync> = Arc::new(tsfn);
    enqueue_all_tree_inner(ctx, items, 0, end, ts, hint, cfg.clone(), enq, Some(tsfn));
}

fn strand_stride(cfg: &RuntimeConfig, last: usize) -> (usize, usize) {
    let epb = cfg.enqueues_per_task.max(1);
    let num_strands = cfg.max_strands.max(1).min(last.div_ceil(epb));
    (epb, num_strands * epb)
}

#[allow(clippy::too_many_arguments)]
fn run_strand<T, F>(
    ctx: &dyn Context,
    items: Arc<[T]>,
    cur: usize,
    stride: usize,
    last: usize,
    ts: Timestamp,
    hint: Hint,
    epb: usize,
    enq: F,
) where
    T: Send + Sync + 'static,
    F: Fn(&dyn Context, Timestamp, &T) + Clone + Send + Sync + 'static,
{
    let end = (cur + epb).min(last);
    for i in cur..end {
        enq(ctx, ts, &items[i]);
    }
    if end == last {
        // This is the one strand whose lane covers the tail: every other
        // lane's final chunk ends strictly before `last` (§4.7).
        tracing::trace!(last, "enqueue_all strand reached the end; enqueuing cleanup");
        ctx.enqueue(Task::new(ts.saturating_add(1), Hint::none(), move |_ctx| drop(items)));
        return;
    }
    let next = cur + stride;
    if next >= last {
        return;
    }
    spawn_strand(ctx, items, next, stride, last, ts, hint, epb, enq);
}

#[allow(clippy::too_many_arguments)]
fn spawn_strand<T, F>(
    ctx: &dyn Context,
    items: Arc<[T]>,
    cur: usize,
    stride: usize,
    last: usize,
    ts: Timestamp,
    hint: Hint,
    epb: usize,
    enq: F,
) where
    T: Send + Sync + 'static,
    F: Fn(&dyn Context, Timestamp, &T) + Clone + Send + Sync + 'static,
{
    ctx.enqueue(Task::new(ts, hint, move |ctx| run_strand(ctx, items, cur, stride, last, ts, hint, epb, enq)));
}

/// Bounded-strand variant (§4.7): splits `items` into up to
/// `min(4 * num_threads, cfg.max_strands)` independent strands of
/// `cfg.enqueues_per_task` consecutive items each; every strand re-chains
/// itself at `cur + stride` until its lane runs out of items. The lane that
/// reaches `last` exactly enqueues a cleanup task that drops the shared
/// slice.
pub fn enqueue_all_strand<T, F>(ctx: &dyn Context, items: Arc<[T]>, ts: Timestamp, hint: Hint, cfg: &RuntimeConfig, enq: F)
where
    T: Send + Sync + 'static,
    F: Fn(&dyn Context, Timestamp, &T) + Clone + Send + Sync + 'static,
{
    let last = items.len();
    if last == 0 {
        return;
    }
    let (epb, stride) = strand_stride(cfg, last);
    let num_strands = stride / epb;
    for s in 0..num_strands {
        let start = s * epb;
        if start >= last {
            break;
        }
        spawn_strand(ctx, Arc::clone(&items), start, stride, last, ts, hint, epb, enq.clone());
    }
}

#[allow(clippy::too_many_arguments)]
fn run_progressive<T, F>(
    ctx: &dyn Context,
    items: Arc<[T]>,
    begin: usize,
    stride: usize,
    maxstride: usize,
    ts: Timestamp,
    hint: Hint,
    epb: usize,
    enq: F,
) where
    T: Send + Sync + 'static,
    F: Fn(&dyn Context, Timestamp, &T) + Clone + Send + Sync + 'static,
{
    let last = items.len();
    let end = (begin + epb).min(last);
    for i in begin..end {
        enq(ctx, ts, &items[i]);
    }
    if end == last {
        ctx.enqueue(Task::new(ts.saturating_add(1), Hint::none(), move |_ctx| drop(items)));
        return;
    }

    if begin + 2 * stride < last && stride < maxstride {
        let items2 = Arc::clone(&items);
        let enq2 = enq.clone();
        spawn_progressive(ctx, items2, begin + stride, 2 * stride, maxstride, ts, hint, epb, enq2);
        spawn_progressive(ctx, items, begin + 2 * stride, 2 * stride, maxstride, ts, hint, epb, enq);
    } else {
        spawn_progressive(ctx, items, begin + stride, stride, maxstride, ts, hint, epb, enq);
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_progressive<T, F>(
    ctx: &dyn Context,
    items: Arc<[T]>,
    begin: usize,
    stride: usize,
    maxstride: usize,
    ts: Timestamp,
    hint: Hint,
    epb: usize,
    enq: F,
) where
    T: Send + Sync + 'static,
    F: Fn(&dyn Context, Timestamp, &T) + Clone + Send + Sync + 'static,
{
    ctx.enqueue(Task::new(ts, hint, move |ctx| {
        run_progressive(ctx, items, begin, stride, maxstride, ts, hint, epb, enq);
    }));
}

/// Progressive-expansion variant (§4.7): begins with one strand of stride
/// `cfg.enqueues_per_task` and doubles its stride (splitting into two
/// strands) each time it still has at least two full strides of room left,
/// up to a stride cap of `cfg.enqueues_per_task * cfg.max_strands`. This
/// delivers the earliest items first and only pays for parallel breadth as
/// the remaining range demands it.
pub fn enqueue_all_progressive<T, F>(ctx: &dyn Context, items: Arc<[T]>, ts: Timestamp, hint: Hint, cfg: &RuntimeConfig, enq: F)
where
    T: Send + Sync + 'static,
    F: Fn(&dyn Context, Timestamp, &T) + Clone + Send + Sync + 'static,
{
    if items.is_empty() {
        return;
    }
    let epb = cfg.enqueues_per_task.max(1);
    let maxstride = epb * cfg.max_strands.max(1);
    spawn_progressive(ctx, items, 0, epb, maxstride, ts, hint, epb, enq);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, SequentialRuntime};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn cfg() -> RuntimeConfig {
        RuntimeConfig::new().backend(BackendKind::Sequential).max_base_enqs(4).max_strands(3).enqueues_per_task(2)
    }

    #[test]
    fn tree_variant_visits_every_item_exactly_once() {
        let rt = SequentialRuntime::new();
        let items: Arc<[u32]> = (0..37u32).collect::<Vec<_>>().into();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let cfg = cfg();
        rt.enqueue(Task::new(5, Hint::none(), move |ctx| {
            enqueue_all(ctx, items, 5, Hint::none(), &cfg, move |_ctx, ts, item| {
                assert_eq!(ts, 5);
                seen2.lock().unwrap().push(*item);
            });
        }));
        rt.run();
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..37u32).collect::<Vec<_>>());
    }

    #[test]
    fn empty_range_invokes_enq_zero_times() {
        let rt = SequentialRuntime::new();
        let items: Arc<[u32]> = Arc::from(Vec::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let cfg = cfg();
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            enqueue_all(ctx, items, 0, Hint::none(), &cfg, move |_ctx, _ts, _item: &u32| {
                calls2.fetch_add(1, Ordering::Relaxed);
            });
        }));
        rt.run();
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn strand_variant_visits_every_item_exactly_once() {
        let rt = SequentialRuntime::new();
        let items: Arc<[u32]> = (0..50u32).collect::<Vec<_>>().into();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let cfg = cfg();
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            enqueue_all_strand(ctx, items, 0, Hint::none(), &cfg, move |_ctx, _ts, item| {
                seen2.lock().unwrap().push(*item);
            });
        }));
        rt.run();
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..50u32).collect::<Vec<_>>());
    }

    #[test]
    fn progressive_variant_visits_every_item_exactly_once() {
        let rt = SequentialRuntime::new();
        let items: Arc<[u32]> = (0..1000u32).collect::<Vec<_>>().into();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let cfg = RuntimeConfig::new().backend(BackendKind::Sequential).enqueues_per_task(7).max_strands(4);
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            enqueue_all_progressive(ctx, items, 0, Hint::none(), &cfg, move |_ctx, _ts, item| {
                seen2.lock().unwrap().push(*item);
            });
        }));
        rt.run();
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..1000u32).collect::<Vec<_>>());
    }

    #[test]
    fn ts_variant_assigns_per_subrange_timestamps() {
        let rt = SequentialRuntime::new();
        // every sub-range's timestamp should equal its first item's value,
        // which is also a non-decreasing function of position.
        let items: Arc<[u32]> = (0..64u32).collect::<Vec<_>>().into();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let cfg = RuntimeConfig::new().backend(BackendKind::Sequential).max_base_enqs(4);
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            enqueue_all_ts(ctx, items, Hint::none(), &cfg, |item| u64::from(*item), move |_ctx, ts, item| {
                seen2.lock().unwrap().push((ts, *item));
            });
        }));
        rt.run();
        for (ts, item) in seen.lock().unwrap().iter() {
            assert!(*ts <= u64::from(*item));
        }
    }
}

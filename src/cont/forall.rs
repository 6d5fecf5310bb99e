// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `forall` and `forall_ts` (C12, §4.9): a fixed-width strand fan-out over
//! `[first, last)`, each strand stepping by the strand count so every index
//! is visited by exactly one strand, with a termination lambda run once
//! every strand has finished.

use crate::backend::RuntimeConfig;
use crate::flags::{Hint, Timestamp};
use crate::task::{Context, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Done = Arc<spin::Mutex<Option<Box<dyn FnOnce(&dyn Context) + Send>>>>;

fn num_strands(len: usize, cfg: &RuntimeConfig) -> usize {
    len.min(4 * cfg.workers.max(1)).max(1)
}

fn strand_finished(ctx: &dyn Context, ts: Timestamp, counter: &AtomicUsize, total: usize, done: &Done) {
    if counter.fetch_add(1, Ordering::AcqRel) + 1 != total {
        return;
    }
    if let Some(done) = done.lock().take() {
        ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| done(ctx)));
    }
}

/// Runs `body(ctx, ts, i)` for every `i` in `[first, last)`, fanned out
/// across `min(last-first, 4*num_threads)` strands, then runs `done` once
/// every strand has finished. Each index is visited exactly once (§8,
/// testable property 8's `forall` analogue).
pub fn forall<F, D>(ctx: &dyn Context, ts: Timestamp, first: usize, last: usize, cfg: &RuntimeConfig, body: F, done: D)
where
    F: Fn(&dyn Context, Timestamp, usize) + Clone + Send + Sync + 'static,
    D: FnOnce(&dyn Context) + Send + 'static,
{
    forall_ts(ctx, first, last, cfg, move |_i| ts, body, done);
}

/// `forall`'s timestamp-lambda variant: `tsfn(i)` computes the timestamp
/// each index's `body` call runs at, rather than a single fixed `ts`.
pub fn forall_ts<F, TF, D>(ctx: &dyn Context, first: usize, last: usize, cfg: &RuntimeConfig, tsfn: TF, body: F, done: D)
where
    F: Fn(&dyn Context, Timestamp, usize) + Clone + Send + Sync + 'static,
    TF: Fn(usize) -> Timestamp + Clone + Send + Sync + 'static,
    D: FnOnce(&dyn Context) + Send + 'static,
{
    let len = last.saturating_sub(first);
    if len == 0 {
        ctx.enqueue(Task::new(tsfn(first), Hint::none(), move |ctx| done(ctx)));
        return;
    }

    let strands = num_strands(len, cfg);
    let counter = Arc::new(AtomicUsize::new(0));
    let done: Done = Arc::new(spin::Mutex::new(Some(Box::new(done))));

    for s in 0..strands {
        spawn_strand(ctx, first + s, strands, last, tsfn.clone(), body.clone(), Arc::clone(&counter), strands, Arc::clone(&done));
    }
}

/// Enqueues the task that processes index `i` (which must be `< last`),
/// then either chains the next index in this strand's lane or — once the
/// lane runs past `last` — reports this strand as finished.
#[allow(clippy::too_many_arguments)]
fn spawn_strand<F, TF>(
    ctx: &dyn Context,
    i: usize,
    stride: usize,
    last: usize,
    tsfn: TF,
    body: F,
    counter: Arc<AtomicUsize>,
    total: usize,
    done: Done,
) where
    F: Fn(&dyn Context, Timestamp, usize) + Clone + Send + Sync + 'static,
    TF: Fn(usize) -> Timestamp + Clone + Send + Sync + 'static,
{
    let ts = tsfn(i);
    ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| {
        body(ctx, ts, i);
        let next = i + stride;
        if next < last {
            spawn_strand(ctx, next, stride, last, tsfn, body, counter, total, done);
        } else {
            strand_finished(ctx, ts, &counter, total, &done);
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SequentialRuntime;
    use std::sync::Mutex;

    #[test]
    fn visits_every_index_exactly_once_then_runs_done() {
        let rt = SequentialRuntime::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let finished = Arc::new(Mutex::new(false));
        let finished2 = Arc::clone(&finished);
        let cfg = RuntimeConfig::new().workers(3);
        rt.enqueue(Task::new(5, Hint::none(), move |ctx| {
            forall(
                ctx,
                5,
                0,
                37,
                &cfg,
                move |_ctx, ts, i| {
                    assert_eq!(ts, 5);
                    seen2.lock().unwrap().push(i);
                },
                move |_ctx| *finished2.lock().unwrap() = true,
            );
        }));
        rt.run();
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..37).collect::<Vec<_>>());
        assert!(*finished.lock().unwrap());
    }

    #[test]
    fn empty_range_runs_done_without_any_body_calls() {
        let rt = SequentialRuntime::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let finished = Arc::new(Mutex::new(false));
        let finished2 = Arc::clone(&finished);
        let cfg = RuntimeConfig::new();
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            forall(
                ctx,
                0,
                3,
                3,
                &cfg,
                move |_ctx, _ts, _i| {
                    calls2.fetch_add(1, Ordering::Relaxed);
                },
                move |_ctx| *finished2.lock().unwrap() = true,
            );
        }));
        rt.run();
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(*finished.lock().unwrap());
    }
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `forall_cc` (C12, §4.9): the same strand fan-out as [`super::forall`],
//! but each iteration gets its own [`Continuation`] instead of advancing
//! automatically — the iteration body decides when (and whether) to resume
//! its strand, so it can itself enqueue further continuations first.

use super::continuation::Continuation;
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

/// Runs `body(ctx, ts, i, cont)` for every `i` in `[first, last)`: `body`
/// must run `cont` (immediately or from some later task it enqueues) to
/// advance its strand to the next index. `done` runs once every strand has
/// resumed its way to the end of its lane.
pub fn forall_cc<F, D>(ctx: &dyn Context, ts: Timestamp, first: usize, last: usize, cfg: &RuntimeConfig, body: F, done: D)
where
    F: Fn(&dyn Context, Timestamp, usize, Continuation<()>) + Clone + Send + Sync + 'static,
    D: FnOnce(&dyn Context) + Send + 'static,
{
    let len = last.saturating_sub(first);
    if len == 0 {
        ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| done(ctx)));
        return;
    }

    let strands = num_strands(len, cfg);
    let counter = Arc::new(AtomicUsize::new(0));
    let done: Done = Arc::new(spin::Mutex::new(Some(Box::new(done))));

    for s in 0..strands {
        spawn_strand(ctx, first + s, strands, last, ts, body.clone(), Arc::clone(&counter), strands, Arc::clone(&done));
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_strand<F>(
    ctx: &dyn Context,
    i: usize,
    stride: usize,
    last: usize,
    ts: Timestamp,
    body: F,
    counter: Arc<AtomicUsize>,
    total: usize,
    done: Done,
) where
    F: Fn(&dyn Context, Timestamp, usize, Continuation<()>) + Clone + Send + Sync + 'static,
{
    ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| {
        let body_next = body.clone();
        let counter_next = Arc::clone(&counter);
        let done_next = Arc::clone(&done);
        let cont = Continuation::new(move |ctx, ()| {
            let next = i + stride;
            if next < last {
                spawn_strand(ctx, next, stride, last, ts, body_next, counter_next, total, done_next);
            } else {
                strand_finished(ctx, ts, &counter_next, total, &done_next);
            }
        });
        body(ctx, ts, i, cont);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SequentialRuntime;
    use std::sync::Mutex;

    #[test]
    fn bodies_that_resume_immediately_visit_every_index() {
        let rt = SequentialRuntime::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let finished = Arc::new(Mutex::new(false));
        let finished2 = Arc::clone(&finished);
        let cfg = RuntimeConfig::new().workers(2);
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            forall_cc(
                ctx,
                0,
                0,
                20,
                &cfg,
                move |ctx, ts, i, cont| {
                    seen2.lock().unwrap().push(i);
                    cont.run(ctx, ());
                    let _ = ts;
                },
                move |_ctx| *finished2.lock().unwrap() = true,
            );
        }));
        rt.run();
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert!(*finished.lock().unwrap());
    }

    #[test]
    fn a_body_can_defer_its_continuation_via_another_task() {
        let rt = SequentialRuntime::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let finished = Arc::new(Mutex::new(false));
        let finished2 = Arc::clone(&finished);
        let cfg = RuntimeConfig::new().workers(1);
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            forall_cc(
                ctx,
                0,
                0,
                5,
                &cfg,
                move |ctx, ts, i, cont| {
                    seen2.lock().unwrap().push(i);
                    ctx.enqueue(crate::task::Task::new(ts, Hint::none(), move |ctx| cont.run(ctx, ())));
                },
                move |_ctx| *finished2.lock().unwrap() = true,
            );
        }));
        rt.run();
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..5).collect::<Vec<_>>());
        assert!(*finished.lock().unwrap());
    }
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `callcc` (C12, §4.9): enqueues a function with a one-shot continuation
//! carrying its return type.

use super::continuation::Continuation;
use crate::flags::{Hint, Timestamp};
use crate::task::{Context, Task};

/// Enqueues `f` to run at `(ts, hint)`, handing it a [`Continuation<T>`]
/// that, when run, enqueues `k` with whatever value `f` resumed it with.
/// This is the task-graph equivalent of "call with current continuation":
/// `f` decides if and when to produce its result, and `k` is what consumes
/// it.
pub fn callcc<T, F, K>(ctx: &dyn Context, ts: Timestamp, hint: Hint, f: F, k: K)
where
    T: Send + 'static,
    F: FnOnce(&dyn Context, Continuation<T>) + Send + 'static,
    K: FnOnce(&dyn Context, T) + Send + 'static,
{
    let cont = Continuation::new(k);
    ctx.enqueue(Task::new(ts, hint, move |ctx| f(ctx, cont)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SequentialRuntime;
    use std::sync::{Arc, Mutex};

    #[test]
    fn continuation_delivers_its_result_to_k() {
        let rt = SequentialRuntime::new();
        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            callcc(
                ctx,
                0,
                Hint::none(),
                |ctx, cont: Continuation<u32>| cont.run(ctx, 7),
                move |_ctx, v| *result2.lock().unwrap() = Some(v),
            );
        }));
        rt.run();
        assert_eq!(*result.lock().unwrap(), Some(7));
    }
}

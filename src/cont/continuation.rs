// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The continuation type (C12, §4.9): a heap-allocated, single-shot
//! callable that resumes control after an asynchronous sub-computation.
//!
//! A boxed `FnOnce` does the job of a virtual-dispatch closure object
//! without a hand-rolled vtable.

use crate::task::Context;

/// A one-shot continuation: call [`Continuation::run`] with the running
/// task's [`Context`] and the computation's result to resume whatever it
/// was waiting to do. Dropping a `Continuation` without running it simply
/// discards the pending resumption — there is no destructor-time panic, as
/// there would be for a future that's dropped unpolled.
pub struct Continuation<T> {
    run: Box<dyn FnOnce(&dyn Context, T) + Send>,
}

impl<T> Continuation<T> {
    /// Wraps a closure as a continuation.
    #[must_use]
    pub fn new(f: impl FnOnce(&dyn Context, T) + Send + 'static) -> Self {
        Self { run: Box::new(f) }
    }

    /// Resumes the continuation with `value`.
    pub fn run(self, ctx: &dyn Context, value: T) {
        (self.run)(ctx, value);
    }
}

/// Builds a [`Continuation`] directly, without enqueuing anything — the
/// counterpart to `callcc` for code that already has a task body and just
/// wants a resumption handle to pass somewhere (§4.9, §6 `getcc`).
#[must_use]
pub fn getcc<T>(f: impl FnOnce(&dyn Context, T) + Send + 'static) -> Continuation<T> {
    Continuation::new(f)
}

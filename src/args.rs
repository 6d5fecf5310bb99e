// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Argument marshalling (C2).
//!
//! A hardware back-end with a fixed-width call frame would choose among a
//! scalar register path, an inline-tuple path, and a heap-tuple path to use
//! that frame as economically as possible. This crate's `enqueue` always
//! boxes its argument tuple (`Box<dyn FnOnce(&dyn Context) + Send>`, see
//! [`crate::task::Task`]) instead, since there is no simulator-controlled
//! ABI here to economize registers for (§4.1). [`MarshalPath`]/[`marshal_path`]
//! still compute which of the three named paths a given argument tuple
//! *would* have taken — purely informational (debug/metrics), never
//! behaviour-affecting.

use crate::error::RuntimeError;
use crate::flags::{MAX_REGS, PLS_APP_MAX_ARGS};
use crate::task::{Context, Task};
use crate::flags::{Hint, Timestamp};

/// A tuple of task arguments. Implemented for `()` through 5-tuples (the
/// `PLS_APP_MAX_ARGS` bound); `enqueue` is generic over this trait rather
/// than over a fixed arity.
pub trait CallArgs: Send + 'static {
    /// Number of arguments in the tuple.
    const ARITY: usize;
    /// The size in bytes of the tuple's widest single argument, used by
    /// [`marshal_path`] to decide whether every argument individually fits
    /// a scalar register.
    const MAX_ARG_WIDTH: usize;
}

const fn max_usize(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}

macro_rules! impl_call_args {
    ($($T:ident),*) => {
        #[allow(non_snake_case, unused_parens)]
        impl<$($T: Send + 'static),*> CallArgs for ($($T,)*) {
            const ARITY: usize = impl_call_args!(@count $($T)*);
            const MAX_ARG_WIDTH: usize = impl_call_args!(@max_width $($T)*);
        }
    };
    (@count) => { 0 };
    (@count $head:ident $($tail:ident)*) => { 1 + impl_call_args!(@count $($tail)*) };
    (@max_width) => { 0 };
    (@max_width $head:ident $($tail:ident)*) => {
        max_usize(core::mem::size_of::<$head>(), impl_call_args!(@max_width $($tail)*))
    };
}

impl_call_args!();
impl_call_args!(A);
impl_call_args!(A, B);
impl_call_args!(A, B, C);
impl_call_args!(A, B, C, D);
impl_call_args!(A, B, C, D, E);

static_assertions::const_assert!(PLS_APP_MAX_ARGS == 5);

/// Which of the three marshalling paths a `CallArgs` tuple would have taken
/// on a register-economizing hardware back-end (§4.1). Informational only.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MarshalPath {
    /// Fits in `MAX_REGS` scalar registers.
    Scalar,
    /// Doesn't fit scalar, but the whole tuple fits in `MAX_REGS` words.
    InlineTuple,
    /// Allocated on the heap; only a pointer crosses the call frame.
    Heap,
}

/// Computes the marshalling path a tuple of type `A` would take: scalar if
/// every argument individually fits one 64-bit register and the arity fits
/// `MAX_REGS`, inline-tuple if the whole tuple still fits `MAX_REGS` words,
/// heap otherwise.
#[must_use]
pub fn marshal_path<A: CallArgs>() -> MarshalPath {
    if A::MAX_ARG_WIDTH <= 8 && A::ARITY <= MAX_REGS && A::ARITY <= PLS_APP_MAX_ARGS {
        MarshalPath::Scalar
    } else if core::mem::size_of::<A>().div_ceil(8).max(1) <= MAX_REGS {
        MarshalPath::InlineTuple
    } else {
        MarshalPath::Heap
    }
}

/// Builds a [`Task`] from a function of `(&dyn Context, Timestamp, Args)`
/// and the argument tuple to call it with. This is the one general-purpose
/// constructor `enqueue`-shaped call sites funnel through; see
/// [`crate::backend`] for the `enqueue(f, ts, hint, args…)` wrappers that
/// build on top of it.
pub fn enqueue_body<F, A>(f: F, timestamp: Timestamp, hint: Hint, args: A) -> Task
where
    F: FnOnce(&dyn Context, Timestamp, A) + Send + 'static,
    A: CallArgs,
{
    Task::new(timestamp, hint, move |ctx| f(ctx, timestamp, args))
}

/// The public, type-checked `enqueue<F>(ts, hint, args…)` surface (§6):
/// validates `A`'s arity against the descriptor path's bound, builds the
/// task via [`enqueue_body`], and hands it to `ctx`.
///
/// # Errors
/// Returns [`RuntimeError::ArgCountExceeded`] if `A::ARITY` exceeds
/// [`PLS_APP_MAX_ARGS`] — unreachable for the tuple impls this crate
/// provides (capped at 5), but `CallArgs` is a public trait and a
/// hand-written impl elsewhere could claim a larger arity.
pub fn enqueue<F, A>(
    ctx: &dyn Context,
    f: F,
    timestamp: Timestamp,
    hint: Hint,
    args: A,
) -> Result<(), RuntimeError>
where
    F: FnOnce(&dyn Context, Timestamp, A) + Send + 'static,
    A: CallArgs,
{
    if A::ARITY > PLS_APP_MAX_ARGS {
        return Err(RuntimeError::ArgCountExceeded { got: A::ARITY, max: PLS_APP_MAX_ARGS });
    }
    ctx.enqueue(enqueue_body(f, timestamp, hint, args));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_matches_tuple_length() {
        assert_eq!(<()>::ARITY, 0);
        assert_eq!(<(u64,)>::ARITY, 1);
        assert_eq!(<(u64, u64)>::ARITY, 2);
        assert_eq!(<(u64, u64, u64, u64, u64)>::ARITY, 5);
    }

    #[test]
    fn small_scalar_tuples_take_the_scalar_path() {
        assert_eq!(marshal_path::<()>(), MarshalPath::Scalar);
        assert_eq!(marshal_path::<(u64,)>(), MarshalPath::Scalar);
    }

    #[test]
    fn multi_arg_tuples_of_register_width_args_also_take_the_scalar_path() {
        // Each argument individually fits one register, and the arity (2)
        // fits MAX_REGS, so this is scalar even though the whole tuple is
        // wider than a single word.
        assert_eq!(marshal_path::<(u64, u64)>(), MarshalPath::Scalar);
        assert_eq!(marshal_path::<(u32, u32, u32)>(), MarshalPath::Scalar);
    }

    #[test]
    fn a_wide_single_argument_takes_the_inline_tuple_path() {
        assert_eq!(marshal_path::<(u128,)>(), MarshalPath::InlineTuple);
    }

    #[test]
    fn oversized_tuples_take_the_heap_path() {
        type Big = (u64, u64, u64, u64, u64, u64, u64, u64);
        assert_eq!(marshal_path::<Big>(), MarshalPath::Heap);
    }

    #[test]
    fn enqueue_body_forwards_timestamp_and_args() {
        use crate::flags::NO_TIMESTAMP;
        struct NullContext;
        impl Context for NullContext {
            fn timestamp(&self) -> Timestamp {
                NO_TIMESTAMP
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
            fn enqueue(&self, _task: Task) {}
            fn deepen(&self, _max_timestamp: Timestamp) {}
            fn undeepen(&self) {}
            fn set_gvt(&self, _timestamp: Timestamp) {}
            fn serialize(&self) {}
            fn clear_read_set(&self) {}
            fn record_as_aborted(&self) {}
        }

        let task = enqueue_body(
            |_ctx, ts, (a, b): (u32, u32)| {
                assert_eq!(ts, 7);
                assert_eq!((a, b), (1, 2));
            },
            7,
            Hint::none(),
            (1u32, 2u32),
        );
        task.run(&NullContext);
    }

    #[test]
    fn enqueue_wrapper_hands_the_built_task_to_the_context() {
        use crate::flags::NO_TIMESTAMP;
        use std::cell::RefCell;

        struct RecordingContext {
            enqueued: RefCell<Vec<Task>>,
        }
        impl Context for RecordingContext {
            fn timestamp(&self) -> Timestamp {
                NO_TIMESTAMP
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
                self.enqueued.borrow_mut().push(task);
            }
            fn deepen(&self, _max_timestamp: Timestamp) {}
            fn undeepen(&self) {}
            fn set_gvt(&self, _timestamp: Timestamp) {}
            fn serialize(&self) {}
            fn clear_read_set(&self) {}
            fn record_as_aborted(&self) {}
        }

        let ctx = RecordingContext { enqueued: RefCell::new(Vec::new()) };
        let result = enqueue(&ctx, |_ctx, _ts, _args: (u32,)| {}, 3, Hint::none(), (9u32,));
        assert!(result.is_ok());
        assert_eq!(ctx.enqueued.borrow().len(), 1);
        assert_eq!(ctx.enqueued.borrow()[0].timestamp(), 3);
    }
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `fill` (part of C11, §4.8).

use super::send_ptr::SendPtr;
use super::{aligned_midpoint, choose_grain_elems, elems_per_line};
use crate::backend::RuntimeConfig;
use crate::flags::{Hint, Timestamp};
use crate::task::{Context, Task};

/// Fills `ptr[0..len)` with clones of `value`, splitting the range across
/// recursively-spawned `__filler` tasks once it's larger than the chosen
/// grain, and aligning each split to a cache-line boundary to avoid
/// false-sharing between the two halves (§4.8).
///
/// # Safety
/// `ptr` must be valid for `len` writes of `T`, and nothing else may read
/// or write through `ptr[0..len)` until every task this call spawns has
/// run — which, for the TLS/hardware back-ends, is only guaranteed once the
/// runtime has drained (`Schedule::run`), not when this function returns.
pub unsafe fn fill<T>(ctx: &dyn Context, ptr: *mut T, len: usize, value: T, ts: Timestamp, cfg: &RuntimeConfig)
where
    T: Clone + Send + 'static,
{
    if len == 0 {
        return;
    }
    let grain = choose_grain_elems::<T>(len, cfg.workers);
    let per_line = elems_per_line::<T>();
    // Safety: forwarded from this function's own contract.
    unsafe {
        spawn_fill(ctx, SendPtr(ptr), len, value, ts, grain, per_line);
    }
}

fn spawn_fill<T>(ctx: &dyn Context, ptr: SendPtr<T>, len: usize, value: T, ts: Timestamp, grain: usize, per_line: usize)
where
    T: Clone + Send + 'static,
{
    if len <= grain {
        // Safety: caller (`fill`/the recursive split below) guarantees
        // `ptr.0` is valid and exclusively owned for `len` elements.
        unsafe { serial_fill(ptr.0, len, &value) };
        return;
    }

    let mid = aligned_midpoint(len, per_line);
    let left = ptr;
    // Safety: `mid < len`, so this stays within the `len`-element region
    // `ptr.0` is valid for.
    let right = SendPtr(unsafe { ptr.0.add(mid) });
    let right_len = len - mid;
    let right_value = value.clone();

    ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| {
        spawn_fill(ctx, left, mid, value, ts, grain, per_line);
    }));
    ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| {
        spawn_fill(ctx, right, right_len, right_value, ts, grain, per_line);
    }));
}

unsafe fn serial_fill<T: Clone>(ptr: *mut T, len: usize, value: &T) {
    for i in 0..len {
        // Safety: forwarded from `spawn_fill`'s caller-upheld contract.
        unsafe { ptr.add(i).write(value.clone()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SequentialRuntime;

    #[test]
    fn fills_every_element() {
        let rt = SequentialRuntime::new();
        let mut buf = vec![0u32; 257];
        let ptr = buf.as_mut_ptr();
        let len = buf.len();
        let cfg = RuntimeConfig::new().workers(4);
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            // Safety: `buf` outlives `rt.run()` below, and nothing else
            // touches it while the runtime drains.
            unsafe { fill(ctx, ptr, len, 7u32, 0, &cfg) };
        }));
        rt.run();
        assert!(buf.iter().all(|&v| v == 7));
    }

    #[test]
    fn zero_length_is_a_no_op() {
        let rt = SequentialRuntime::new();
        let mut buf: Vec<u32> = Vec::new();
        let ptr = buf.as_mut_ptr();
        let cfg = RuntimeConfig::new();
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| unsafe {
            fill(ctx, ptr, 0, 1u32, 0, &cfg);
        }));
        rt.run();
        assert!(buf.is_empty());
    }
}

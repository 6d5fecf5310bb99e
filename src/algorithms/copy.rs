// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `copy` (part of C11, §4.8).

use super::send_ptr::SendPtr;
use super::{aligned_midpoint, choose_grain_elems, elems_per_line};
use crate::backend::RuntimeConfig;
use crate::error::RuntimeError;
use crate::flags::{Hint, Timestamp};
use crate::task::{Context, Task};

fn ranges_overlap<T>(a: *const T, a_len: usize, b: *const T, b_len: usize) -> bool {
    let a_start = a as usize;
    let a_end = a_start + a_len * core::mem::size_of::<T>();
    let b_start = b as usize;
    let b_end = b_start + b_len * core::mem::size_of::<T>();
    a_start < b_end && b_start < a_end
}

/// Copies `src[0..len)` into `dst[0..len)`, splitting the range across
/// recursively-spawned tasks the same way [`super::fill`] does, aligning on
/// the destination's cache lines (§4.8).
///
/// # Safety
/// `src` must be valid to read, and `dst` valid to write, for `len`
/// elements each; neither range may be read or written by anything else
/// until every spawned task has run (see [`super::fill`]'s safety note).
pub unsafe fn copy<T>(
    ctx: &dyn Context,
    src: *const T,
    dst: *mut T,
    len: usize,
    ts: Timestamp,
    cfg: &RuntimeConfig,
) -> Result<(), RuntimeError>
where
    T: Copy + Send + 'static,
{
    if len == 0 {
        return Ok(());
    }
    if ranges_overlap(src, len, dst, len) {
        return Err(RuntimeError::OverlappingRanges);
    }

    let grain = choose_grain_elems::<T>(len, cfg.workers);
    let per_line = elems_per_line::<T>();
    // Safety: forwarded from this function's own contract; overlap was
    // already rejected above.
    unsafe {
        spawn_copy(ctx, SendPtr(src as *mut T), SendPtr(dst), len, ts, grain, per_line);
    }
    Ok(())
}

fn spawn_copy<T>(ctx: &dyn Context, src: SendPtr<T>, dst: SendPtr<T>, len: usize, ts: Timestamp, grain: usize, per_line: usize)
where
    T: Copy + Send + 'static,
{
    if len <= grain {
        // Safety: caller upholds validity/exclusivity for `len` elements on
        // both `src.0` and `dst.0`.
        unsafe { std::ptr::copy_nonoverlapping(src.0, dst.0, len) };
        return;
    }

    let mid = aligned_midpoint(len, per_line);
    // Safety: `mid < len`, staying within the valid region on both sides.
    let (src_left, src_right) = (src, SendPtr(unsafe { src.0.add(mid) }));
    let (dst_left, dst_right) = (dst, SendPtr(unsafe { dst.0.add(mid) }));
    let right_len = len - mid;

    ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| {
        spawn_copy(ctx, src_left, dst_left, mid, ts, grain, per_line);
    }));
    ctx.enqueue(Task::new(ts, Hint::none(), move |ctx| {
        spawn_copy(ctx, src_right, dst_right, right_len, ts, grain, per_line);
    }));
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Parallel higher-order primitives built atop the task model (C10, C11):
//! the enqueue-all engines, `fill`, `copy`, `transform`, and `reduce`.
//!
//! `fill`/`copy`/`transform` hand out disjoint sub-ranges of a raw buffer to
//! recursively-spawned tasks, so they take raw pointers rather than `&mut
//! [T]` — a borrow can't cross into the `'static` task closures the
//! scheduler requires. Callers are responsible for keeping the buffer alive
//! and free of other aliases until every spawned sub-task has run (§4.8);
//! each function documents the exact contract at its `unsafe` boundary.

mod fill;
mod copy;
mod transform;
mod reduce;
mod send_ptr;

pub use fill::fill;
pub use copy::copy;
pub use transform::transform;
pub use reduce::reduce;

pub use crate::enqueue_all::{enqueue_all, enqueue_all_progressive, enqueue_all_strand, enqueue_all_ts};

use crate::flags::CACHE_LINE;

/// Number of `T`-sized elements per cache line, at least 1 (for `T` larger
/// than a cache line).
#[must_use]
pub(crate) fn elems_per_line<T>() -> usize {
    (CACHE_LINE as usize / core::mem::size_of::<T>().max(1)).max(1)
}

/// Picks a grain size, in elements, from `{1,2,4,8,16}` cache lines: the
/// largest that still leaves each of `num_threads` workers roughly four
/// grains' worth of leaf work, per §4.8.
#[must_use]
pub(crate) fn choose_grain_elems<T>(len: usize, num_threads: usize) -> usize {
    let per_line = elems_per_line::<T>();
    let target_tasks = (num_threads.max(1) * 4).max(1);
    let ideal_lines = (len / per_line).max(1) / target_tasks;
    let lines = [16usize, 8, 4, 2, 1].into_iter().find(|&g| ideal_lines >= g).unwrap_or(1);
    lines * per_line
}

/// Splits `len` in half, rounding the midpoint down to a multiple of
/// `per_line` so the two halves don't share a cache line, and clamping it
/// into `[1, len - 1]` so both halves stay non-empty.
#[must_use]
pub(crate) fn aligned_midpoint(len: usize, per_line: usize) -> usize {
    let raw_mid = len / 2;
    let aligned = (raw_mid / per_line.max(1)) * per_line.max(1);
    aligned.clamp(1, len - 1)
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `transform` (part of C11, §4.8): a tiled `forall` over output cache
//! lines, each tile running a serial `src -> dst` transform with a spatial
//! hint derived from the cache line it writes.

use super::send_ptr::SendPtr;
use super::elems_per_line;
use crate::backend::RuntimeConfig;
use crate::flags::{cache_line_hint, Hint, Timestamp};
use crate::task::{Context, Task};

/// Applies `f` to each of `src[0..len)`, writing the result into the
/// matching slot of `dst[0..len)`, tiled into `elems_per_line::<U>()`-sized
/// blocks each run by its own task. Each task's hint is the cache-line hint
/// of the first output element it writes (§4.8), so the spatial mapper can
/// place transform tasks near the memory they touch.
///
/// # Safety
/// `src` must be valid to read for `len` elements of `T`, `dst` valid to
/// write for `len` elements of `U`; see [`super::fill`]'s safety note about
/// when the buffers must remain alive and unaliased.
pub unsafe fn transform<T, U, F>(
    ctx: &dyn Context,
    src: *const T,
    dst: *mut U,
    len: usize,
    ts: Timestamp,
    cfg: &RuntimeConfig,
    f: F,
) where
    T: Send + Sync + 'static,
    U: Send + 'static,
    F: Fn(&T) -> U + Clone + Send + Sync + 'static,
{
    if len == 0 {
        return;
    }
    let block = elems_per_line::<U>().min(len).max(1);
    let _ = cfg;

    let mut start = 0;
    while start < len {
        let end = (start + block).min(len);
        // Safety: `start < len` and `end <= len`, both within the regions
        // the caller guarantees `src`/`dst` are valid for.
        let block_src = SendPtr(unsafe { src.add(start) } as *mut T);
        let block_dst = SendPtr(unsafe { dst.add(start) });
        let block_len = end - start;
        let hint = Hint::new(cache_line_hint(block_dst.0 as usize), crate::flags::EnqFlags::empty());
        let f = f.clone();

        ctx.enqueue(Task::new(ts, hint, move |_ctx| {
            // Safety: forwarded from the caller's contract on `src`/`dst`;
            // this task owns `[start, end)` exclusively.
            unsafe { serial_transform(block_src.0 as *const T, block_dst.0, block_len, &f) };
        }));

        start = end;
    }
}

unsafe fn serial_transform<T, U, F: Fn(&T) -> U>(src: *const T, dst: *mut U, len: usize, f: &F) {
    for i in 0..len {
        // Safety: forwarded from `transform`'s caller-upheld contract.
        unsafe {
            let value = f(&*src.add(i));
            dst.add(i).write(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SequentialRuntime;

    #[test]
    fn transforms_every_element() {
        let rt = SequentialRuntime::new();
        let src: Vec<u32> = (0..300).collect();
        let mut dst = vec![0u32; 300];
        let src_ptr = src.as_ptr();
        let dst_ptr = dst.as_mut_ptr();
        let len = src.len();
        let cfg = RuntimeConfig::new();
        rt.enqueue(Task::new(0, Hint::none(), move |ctx| {
            // Safety: `src`/`dst` outlive `rt.run()`.
            unsafe { transform(ctx, src_ptr, dst_ptr, len, 0, &cfg, |x: &u32| x * 2) };
        }));
        rt.run();
        assert_eq!(dst, src.iter().map(|x| x * 2).collect::<Vec<_>>());
    }
}

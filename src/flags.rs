// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use bitflags::bitflags;

/// A 64-bit virtual timestamp. Totally ordered; smaller is earlier.
pub type Timestamp = u64;

/// Sentinel meaning "no timestamp" / "not currently inside a task".
pub const NO_TIMESTAMP: Timestamp = u64::MAX;

/// Compile-time bound on the number of arguments a task can carry through
/// the descriptor (spill/requeue) representation, §3.
pub const PLS_APP_MAX_ARGS: usize = 5;

/// Number of machine words the scalar/inline-tuple marshalling paths (§4.1)
/// will use before falling back to a heap allocation.
pub const MAX_REGS: usize = 5;

bitflags! {
    /// Enqueue-time flags. Bits 4-15 are *persistent* (carried across a
    /// spill/requeue round-trip); bits 16-29 are *transient* (re-derived by
    /// the requeuer from context, never copied out of a [`TaskDescriptor`]).
    ///
    /// [`TaskDescriptor`]: crate::spill::TaskDescriptor
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct EnqFlags: u32 {
        /// Map hint by modulo rather than by hash.
        const NOHASH = 1 << 4;
        /// Deprioritise against same-timestamp peers (enqueuers/splitters).
        const PRODUCER = 1 << 5;
        /// May run speculatively; also allowed non-speculatively if GVT matches.
        const MAYSPEC = 1 << 6;
        /// Must run non-speculatively.
        const CANTSPEC = 1 << 7;
        /// No timestamp; excluded from GVT.
        const NOTIMESTAMP = 1 << 9;
        /// Non-speculative requeuer task.
        const REQUEUER = 1 << 10;
        /// May run in parallel with same-hint peers.
        const NONSERIALHINT = 1 << 11;

        /// No spatial hint supplied.
        const NOHINT = 1 << 16;
        /// Reuse the current task's hint.
        const SAMEHINT = 1 << 17;
        /// Reuse the current task's function pointer.
        const SAMETASK = 1 << 18;
        /// Reuse the current task's timestamp (deprecated).
        const SAMETIME = 1 << 19;
        /// Requeue and yield the caller if the target buffer is full.
        const YIELDIFFULL = 1 << 20;
        /// Target the enclosing domain.
        const PARENTDOMAIN = 1 << 21;
        /// Target the child domain just opened by a pending `deepen`.
        const SUBDOMAIN = 1 << 22;
        /// Target the outermost enclosing domain.
        const SUPERDOMAIN = 1 << 23;
        /// Runs if the parent aborts; discarded on commit.
        const RUNONABORT = 1 << 24;
    }
}

impl EnqFlags {
    /// Bits 4-15: preserved by the spiller across a spill/requeue round-trip.
    pub const PERSISTENT_MASK: u32 = 0x0000_fff0;
    /// Bits 16-29: discarded by the spiller, re-derived by the requeuer.
    pub const TRANSIENT_MASK: u32 = 0x3fff_0000;

    /// The subset of these flags that survives a spill into a [`TaskDescriptor`].
    ///
    /// [`TaskDescriptor`]: crate::spill::TaskDescriptor
    #[must_use]
    pub fn persistent(self) -> Self {
        Self::from_bits_truncate(self.bits() & Self::PERSISTENT_MASK)
    }

    /// `true` if the enqueue call frame omits the timestamp argument.
    #[must_use]
    pub fn omits_timestamp(self) -> bool {
        self.intersects(Self::NOTIMESTAMP | Self::SAMETIME | Self::RUNONABORT)
    }

    /// `true` if the enqueue call frame omits the function-pointer argument.
    #[must_use]
    pub fn omits_task_ptr(self) -> bool {
        self.contains(Self::SAMETASK)
    }

    /// `true` if the enqueue call frame omits the hint argument.
    #[must_use]
    pub fn omits_hint(self) -> bool {
        self.intersects(Self::SAMEHINT | Self::NOHINT)
    }
}

/// The `(hint, flags)` pair attached to every enqueue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Hint {
    /// Hash-key the spatial mapper uses to place the task on a tile.
    pub hint: u64,
    pub flags: EnqFlags,
}

impl Hint {
    #[must_use]
    pub const fn new(hint: u64, flags: EnqFlags) -> Self {
        Self { hint, flags }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self { hint: 0, flags: EnqFlags::NOHINT }
    }

    #[must_use]
    pub const fn same() -> Self {
        Self { hint: 0, flags: EnqFlags::SAMEHINT }
    }
}

/// Size, in bytes, of a cache line — used to align `fill`/`copy`/`transform`
/// grain boundaries (§4.8) and to compute the cache-line hint below.
pub const CACHE_LINE: u64 = 64;

/// `floor(address / CACHE_LINE)`, the canonical hint for "this task touches
/// the cache line containing `addr`".
#[must_use]
pub fn cache_line_hint(addr: usize) -> u64 {
    (addr as u64) / CACHE_LINE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_mask_excludes_transient_bits() {
        let f = EnqFlags::CANTSPEC | EnqFlags::NOHINT | EnqFlags::REQUEUER;
        let p = f.persistent();
        assert!(p.contains(EnqFlags::CANTSPEC));
        assert!(p.contains(EnqFlags::REQUEUER));
        assert!(!p.contains(EnqFlags::NOHINT));
    }

    #[test]
    fn omission_rules() {
        assert!(EnqFlags::NOTIMESTAMP.omits_timestamp());
        assert!(EnqFlags::SAMETIME.omits_timestamp());
        assert!(EnqFlags::RUNONABORT.omits_timestamp());
        assert!(!EnqFlags::CANTSPEC.omits_timestamp());

        assert!(EnqFlags::SAMETASK.omits_task_ptr());
        assert!(!EnqFlags::NOHINT.omits_task_ptr());

        assert!(EnqFlags::NOHINT.omits_hint());
        assert!(EnqFlags::SAMEHINT.omits_hint());
        assert!(!EnqFlags::PRODUCER.omits_hint());
    }

    #[test]
    fn cache_line_hint_is_floor_division() {
        assert_eq!(cache_line_hint(0), 0);
        assert_eq!(cache_line_hint(63), 0);
        assert_eq!(cache_line_hint(64), 1);
        assert_eq!(cache_line_hint(127), 1);
    }
}

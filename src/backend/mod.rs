// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The interchangeable scheduling back-ends (C6, C7, C8) behind a single
//! [`Schedule`] trait, grounded on `libs/async-exec/src/scheduler.rs`'s
//! `Schedule`/`Tick` shape.
//!
//! The hardware back-end itself (real simulator integration) is out of
//! scope (§1); [`crate::sim::SimBackend`] is its trait boundary and
//! [`crate::spill`] is the protocol the hardware back-end would drive
//! through it.

pub mod oracle;
pub mod sequential;
pub mod tls;

pub use oracle::OracleRuntime;
pub use sequential::SequentialRuntime;
pub use tls::TlsRuntime;

/// Information about a scheduler's state after a bounded batch of ticks,
/// mirroring `async_exec::scheduler::Tick`.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct Tick {
    /// `true` if tasks remain after this tick.
    pub has_remaining: bool,
    /// Number of tasks polled (run to completion) on this tick.
    pub polled: usize,
    /// Number of tasks polled that panicked, wrapped and logged rather than
    /// taking down the worker (TLS back-end only).
    #[cfg(feature = "counters")]
    pub panicked: usize,
}

/// A scheduler that can execute a bounded batch of tasks at a time.
pub trait Schedule {
    /// Runs at most `n` tasks, returning a [`Tick`] describing what
    /// happened. Callers should keep calling this as long as
    /// `Tick::has_remaining` is `true`.
    fn tick_n(&self, n: usize) -> Tick;

    /// Runs the scheduler to completion (until `tick_n` reports nothing
    /// remaining).
    fn run(&self) {
        const BATCH: usize = 256;
        loop {
            let tick = self.tick_n(BATCH);
            if !tick.has_remaining {
                break;
            }
        }
    }
}

/// Selects which back-end a [`RuntimeConfig`] should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sequential,
    Oracle,
    Tls,
    /// Real simulator integration; out of this crate's scope (§1).
    Hardware,
}

/// A small fluent builder for the tuning knobs shared across back-ends and
/// the parallel primitives built on top of them.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub workers: usize,
    pub backend: BackendKind,
    pub max_base_enqs: usize,
    pub max_strands: usize,
    pub enqueues_per_task: usize,
    pub spill_batch: usize,
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            backend: BackendKind::Tls,
            max_base_enqs: 256,
            max_strands: 4,
            enqueues_per_task: 64,
            spill_batch: 32,
        }
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub fn max_base_enqs(mut self, max_base_enqs: usize) -> Self {
        self.max_base_enqs = max_base_enqs;
        self
    }

    #[must_use]
    pub fn max_strands(mut self, max_strands: usize) -> Self {
        self.max_strands = max_strands;
        self
    }

    #[must_use]
    pub fn enqueues_per_task(mut self, enqueues_per_task: usize) -> Self {
        self.enqueues_per_task = enqueues_per_task;
        self
    }

    #[must_use]
    pub fn spill_batch(mut self, spill_batch: usize) -> Self {
        self.spill_batch = spill_batch;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

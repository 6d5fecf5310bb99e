// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The TLS (thread-level speculation) / parallel back-end (C8): `T`
//! workers pulling from one shared priority queue (§4.5).

use crate::error::RuntimeError;
use crate::flags::{NO_TIMESTAMP, Timestamp};
use crate::park::{Park, ParkingLot, Parker, StdPark};
use crate::queue::{PriorityQueue, TimestampQueue};
use crate::task::{Context, Task};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A cache-line-padded `AtomicU64`, used for per-worker `minTs` so
/// concurrent readers never false-share it with neighbouring workers'
/// slots (§5, §9).
#[repr(align(64))]
struct CacheLinePad(AtomicU64);

impl CacheLinePad {
    fn new(v: u64) -> Self {
        Self(AtomicU64::new(v))
    }
}

struct TlsShared {
    queue: Box<dyn TimestampQueue>,
    min_ts: Vec<CacheLinePad>,
    parking_lot: ParkingLot<StdPark>,
    stopped: AtomicBool,
}

/// `T` workers, each repeatedly dequeuing the shared priority queue's
/// current minimum and running it, parking when the queue is empty.
pub struct TlsRuntime {
    shared: Arc<TlsShared>,
    workers: Vec<JoinHandle<()>>,
}

impl TlsRuntime {
    /// Spawns `num_threads` workers over a queue seeded with `initial`.
    #[must_use]
    pub fn spawn(num_threads: usize, initial: Vec<Task>) -> Self {
        assert!(num_threads >= 1, "TLS runtime needs at least one worker");

        let mut queue = PriorityQueue::new();
        for task in initial {
            queue.push(task);
        }

        let shared = Arc::new(TlsShared {
            queue: Box::new(spin::Mutex::new(queue)),
            min_ts: (0..num_threads).map(|_| CacheLinePad::new(0)).collect(),
            parking_lot: ParkingLot::with_capacity(num_threads),
            stopped: AtomicBool::new(false),
        });

        let workers = (0..num_threads)
            .map(|tid| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("chronoq-tls-{tid}"))
                    .spawn(move || worker_loop(&shared, tid))
                    .expect("failed to spawn TLS worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Enqueues a task from outside any worker (e.g. the caller's own
    /// thread, seeding more work after start-up).
    ///
    /// # Errors
    /// Returns [`RuntimeError::Closed`] if [`TlsRuntime::stop`] has already
    /// been observed; the task is not pushed in that case, since workers may
    /// already have exited and nothing would ever dequeue it.
    pub fn enqueue(&self, task: Task) -> Result<(), RuntimeError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(RuntimeError::Closed);
        }
        self.shared.queue.push(task);
        self.shared.parking_lot.unpark_one();
        Ok(())
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.shared.min_ts.len()
    }

    /// A conservative lower bound on the timestamp of any task this worker
    /// may subsequently dequeue (§3 invariants).
    #[must_use]
    pub fn min_ts(&self, tid: usize) -> Timestamp {
        self.shared.min_ts[tid].0.load(Ordering::Relaxed)
    }

    /// Signals every worker to exit once the queue drains, and wakes any
    /// that are currently parked.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.parking_lot.unpark_all();
    }

    /// Stops the runtime and waits for every worker to exit.
    ///
    /// # Panics
    /// Propagates a panic from a worker thread's own join, if its
    /// `JoinHandle` itself panicked (task panics are already caught and
    /// logged inside the worker loop; see `record_as_aborted`/`tracing::error!`).
    pub fn join(self) {
        self.stop();
        for worker in self.workers {
            worker.join().expect("TLS worker thread panicked");
        }
    }
}

fn worker_loop(shared: &Arc<TlsShared>, tid: usize) {
    let ctx = TlsContext { shared: Arc::clone(shared), tid, current_timestamp: Cell::new(NO_TIMESTAMP) };

    loop {
        match shared.queue.pop_top() {
            Some(task) => {
                let ts = task.timestamp();
                let min = shared.queue.peek_min_ts().unwrap_or(ts);
                shared.min_ts[tid].0.store(min, Ordering::Relaxed);
                ctx.current_timestamp.set(ts);

                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run(&ctx)));
                if let Err(payload) = result {
                    tracing::error!(tid, panic = %panic_message(&payload), "task panicked; worker continues");
                }
            }
            None => {
                if shared.stopped.load(Ordering::Acquire) {
                    break;
                }
                // A short, jittered spin before parking: most empty-queue
                // windows under bursty enqueue traffic close within a few
                // microseconds, and staggering each worker's spin count
                // keeps them from all re-checking the queue in lockstep.
                let spins = fastrand::usize(0..64);
                let mut found = false;
                for _ in 0..spins {
                    if !shared.queue.is_empty() {
                        found = true;
                        break;
                    }
                    std::hint::spin_loop();
                }
                if found {
                    continue;
                }
                // Register as parked *before* re-checking the queue, so a
                // producer's push-then-`unpark_one` that lands in the gap
                // between our `pop_top` above and this registration is
                // still observed here rather than silently dropped (a
                // registration the producer's `unpark_one` found nobody to
                // wake against).
                let parker = Parker::new(StdPark::for_current());
                shared.parking_lot.register(&parker);
                if shared.queue.is_empty() && !shared.stopped.load(Ordering::Acquire) {
                    parker.park();
                }
                shared.parking_lot.unregister(&parker);
                if shared.stopped.load(Ordering::Acquire) && shared.queue.is_empty() {
                    break;
                }
            }
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

struct TlsContext {
    shared: Arc<TlsShared>,
    tid: usize,
    current_timestamp: Cell<Timestamp>,
}

impl Context for TlsContext {
    fn timestamp(&self) -> Timestamp {
        self.current_timestamp.get()
    }

    fn super_timestamp(&self) -> Timestamp {
        NO_TIMESTAMP
    }

    fn tid(&self) -> usize {
        self.tid
    }

    fn num_threads(&self) -> usize {
        self.shared.min_ts.len()
    }

    fn enqueue(&self, task: Task) {
        let ts = task.timestamp();
        self.shared.queue.push(task);

        let slot = &self.shared.min_ts[self.tid].0;
        let mut cur = slot.load(Ordering::Relaxed);
        while ts < cur {
            match slot.compare_exchange_weak(cur, ts, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }

        self.shared.parking_lot.unpark_one();
    }

    fn deepen(&self, _max_timestamp: Timestamp) {
        panic!("TLS backend does not implement fractal time domains (§9)")
    }

    fn undeepen(&self) {
        panic!("TLS backend does not implement fractal time domains (§9)")
    }

    fn set_gvt(&self, _timestamp: Timestamp) {}

    fn serialize(&self) {}

    fn clear_read_set(&self) {}

    fn record_as_aborted(&self) {}
}

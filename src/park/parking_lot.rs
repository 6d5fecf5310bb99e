// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::loom::sync::atomic::{AtomicUsize, Ordering};
use crate::park::parker::Parker;
use crate::park::{Park, UnparkToken};
use spin::Mutex;

#[derive(Debug)]
pub struct ParkingLot<P> {
    /// Number of parked workers.
    num_parked: AtomicUsize,
    unpark_tokens: Mutex<Vec<UnparkToken<P>>>,
}

// === impl ParkingLot ===

impl<P: Park + Send + Sync> ParkingLot<P> {
    pub const fn new() -> Self {
        Self {
            num_parked: AtomicUsize::new(0),
            unpark_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            num_parked: AtomicUsize::new(0),
            unpark_tokens: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn num_parked(&self) -> usize {
        self.num_parked.load(Ordering::Acquire)
    }

    /// Park the calling worker using the provided `Parker`.
    ///
    /// Once parked, the worker will not make progress until unparked
    /// through either `Self::unpark_one` or `Self::unpark_all`.
    pub fn park(&self, parker: Parker<P>) {
        self.transition_to_parked();

        self.unpark_tokens.lock().push(parker.clone().into_unpark());
        parker.park();

        self.transition_from_parked();
    }

    /// Registers `parker` as parked without blocking.
    ///
    /// Callers that need to re-check a wake condition between "queue looked
    /// empty" and "actually call `Parker::park`" should use
    /// `register`/`unregister` directly instead of `Self::park`, which
    /// registers and blocks as one step and would otherwise race a producer
    /// whose `unpark_one` finds no token yet and silently drops the wakeup
    /// (§5, §9 "Per-thread `minTs`" design note's sibling race for parking).
    pub fn register(&self, parker: &Parker<P>) {
        self.transition_to_parked();
        self.unpark_tokens.lock().push(parker.clone().into_unpark());
    }

    /// Removes `parker`'s own registration if it's still present (i.e. it
    /// never actually blocked in `Parker::park`), and always closes out the
    /// `num_parked` accounting `Self::register` opened. Call this after
    /// `register` whether or not `Parker::park` was actually invoked.
    pub fn unregister(&self, parker: &Parker<P>) {
        self.unpark_tokens.lock().retain(|token| !token.same_worker(parker));
        self.transition_from_parked();
    }

    /// Unpark a single worker, blocking if the queue of parked targets is busy.
    /// Returns `true` when a target was unparked and `false` otherwise.
    ///
    /// This method will choose an arbitrary worker that has previously parked
    /// itself through `Self::park`. The order in which individual targets are
    /// woken is *not defined* and may change at any point.
    pub fn unpark_one(&self) -> bool {
        if let Some(token) = self.unpark_tokens.lock().pop() {
            token.unpark();
            true
        } else {
            false
        }
    }

    /// Unpark all currently parked workers, returning the number of targets
    /// that were unparked.
    ///
    /// This method will unpark workers in an arbitrary order, no guarantee
    /// is made about specific ordering and the underlying implementation may
    /// change at any point.
    pub fn unpark_all(&self) -> usize {
        let mut tokens = self.unpark_tokens.lock();
        let mut unparked = 0;

        while let Some(token) = tokens.pop() {
            token.unpark();
            unparked += 1;
        }

        unparked
    }

    fn transition_to_parked(&self) {
        let prev = self.num_parked.fetch_add(1, Ordering::Release);
        assert_ne!(prev, usize::MAX);
    }

    fn transition_from_parked(&self) {
        let prev = self.num_parked.fetch_sub(1, Ordering::Release);
        assert_ne!(prev, 0);
    }
}

impl<P: Park + Send + Sync> Default for ParkingLot<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loom::sync::Arc;
    use crate::loom::sync::atomic::AtomicUsize;
    use crate::loom::thread;
    use crate::park::StdPark;

    // FIXME this test deadlocks under loom :/ figure out why and fix
    #[cfg(not(loom))]
    #[test]
    fn parking_lot_basically_works() {
        crate::loom::model(|| {
            crate::loom::lazy_static! {
                static ref UNPARKED: AtomicUsize = AtomicUsize::new(0);
            }

            let lot: Arc<ParkingLot<StdPark>> = Arc::new(ParkingLot::with_capacity(4));

            let joins: Vec<_> = (0..4)
                .map(|_| {
                    let lot = lot.clone();
                    thread::spawn(move || {
                        lot.park(Parker::new(StdPark::for_current()));
                        UNPARKED.fetch_add(1, Ordering::Release);
                    })
                })
                .collect();

            let mut spins = 0;
            for _ in 0..4 {
                while !lot.unpark_one() {
                    spins += 1;
                    assert!(spins < 1_000_000, "unpark_one never found a parked worker");
                    std::hint::spin_loop();
                }
            }

            for join in joins {
                join.join().unwrap();
            }

            assert_eq!(UNPARKED.load(Ordering::Acquire), 4);
        })
    }

    #[test]
    fn unregister_without_parking_leaves_no_stale_token() {
        let lot: ParkingLot<StdPark> = ParkingLot::with_capacity(1);
        let parker = Parker::new(StdPark::for_current());

        lot.register(&parker);
        assert_eq!(lot.num_parked(), 1);
        // Recheck found work before actually calling `parker.park()`.
        lot.unregister(&parker);

        assert_eq!(lot.num_parked(), 0);
        assert!(!lot.unpark_one(), "no token should remain after unregister");
    }
}

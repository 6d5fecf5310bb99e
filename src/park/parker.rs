// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::loom::sync::Arc;
use crate::park::Park;
use static_assertions::assert_impl_all;

#[derive(Debug)]
pub struct Parker<P>(Arc<P>);

#[derive(Debug, Clone)]
pub struct UnparkToken<P>(Parker<P>);
assert_impl_all!(UnparkToken<()>: Send, Sync);

// === impl Parker ===

impl<P> Clone for Parker<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P: Park> Parker<P> {
    pub fn new(park_impl: P) -> Self {
        Self(Arc::new(park_impl))
    }

    #[inline]
    pub fn park(&self) {
        self.0.park();
    }

    /// Attempts to unpark itself, panicking if that fails.
    ///
    /// This method isn't terribly useful, but in certain circumstances
    /// (e.g. in a simulator callback) may allow a worker to wake itself
    /// correctly.
    #[inline]
    pub fn unpark(&self) {
        self.0.unpark();
    }

    /// Convert this [`Parker`] into an [`UnparkToken`] which can be used to
    /// wake up this worker from elsewhere.
    #[inline]
    pub fn into_unpark(self) -> UnparkToken<P> {
        UnparkToken(self)
    }

    /// `true` if `self` and `other` refer to the same underlying parked
    /// worker, used by [`crate::park::ParkingLot::unregister`] to drop a
    /// stale registration without waking anyone.
    #[inline]
    pub(crate) fn same_worker(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// === impl UnparkToken ===

impl<P: Park> UnparkToken<P> {
    /// Unparks the target.
    #[inline]
    pub fn unpark(&self) {
        self.0.0.unpark();
    }

    /// `true` if this token was produced from `parker`, i.e. unparking it
    /// wakes the same worker.
    #[inline]
    pub(crate) fn same_worker(&self, parker: &Parker<P>) -> bool {
        self.0.same_worker(parker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loom::sync::atomic::{AtomicBool, Ordering};
    use crate::loom::thread;
    use crate::park::StdPark;
    use std::sync::mpsc;

    #[test]
    fn parking_basically_works() {
        // Thread A parks itself using `Parker::park` and thread B wakes it
        // back up through an `UnparkToken` sent over a channel.
        crate::loom::model(|| {
            static A_UNPARKED: AtomicBool = AtomicBool::new(false);
            let (tx, rx) = mpsc::channel();

            let a = thread::spawn(move || {
                let parker = Parker::new(StdPark::for_current());

                tx.send(parker.clone().into_unpark()).unwrap();

                parker.park();

                A_UNPARKED.store(true, Ordering::Release);
            });

            let b = thread::spawn(move || {
                let unpark = rx.recv().unwrap();
                unpark.unpark();
            });

            let _ = a.join();
            let _ = b.join();

            assert!(A_UNPARKED.load(Ordering::Acquire));
        });
    }
}

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The oracle back-end (C7): a domain-aware loop modelling ideal
//! speculation with a stack of per-domain priority queues (§4.4).
//!
//! This loop runs on a dedicated `std::thread` rather than a
//! stack-switched coroutine, giving the simulator the same clean
//! "task-only" call stack without `setjmp`/`longjmp`-style context
//! switching.

use crate::domain::DomainStack;
use crate::flags::{EnqFlags, NO_TIMESTAMP, Timestamp};
use crate::id::Uid;
use crate::task::{Context, Task};
use std::cell::{Cell, RefCell};
use std::thread::JoinHandle;

/// Owns the dedicated oracle thread. Seed the initial tasks through
/// [`OracleRuntime::run`]; further enqueues happen from inside running
/// tasks via [`Context::enqueue`], since the oracle loop and every task it
/// runs share the same thread.
pub struct OracleRuntime {
    handle: JoinHandle<()>,
}

impl OracleRuntime {
    /// Spawns the oracle thread, seeds its root domain with `initial`, and
    /// starts draining. Returns immediately; call [`OracleRuntime::join`] to
    /// wait for completion.
    #[must_use]
    pub fn run(initial: Vec<Task>) -> Self {
        let handle = std::thread::Builder::new()
            .name("chronoq-oracle".into())
            .spawn(move || {
                let ctx = OracleContext::new(initial);
                ctx.drain();
            })
            .expect("failed to spawn oracle worker thread");
        Self { handle }
    }

    /// Waits for every domain to drain.
    ///
    /// # Panics
    /// Propagates a panic from the oracle thread, if one occurred.
    pub fn join(self) {
        self.handle.join().expect("oracle thread panicked");
    }
}

struct OracleContext {
    domains: RefCell<DomainStack>,
    current_uid: Cell<Option<Uid>>,
    current_timestamp: Cell<Timestamp>,
}

impl OracleContext {
    fn new(initial: Vec<Task>) -> Self {
        let mut stack = DomainStack::new();
        for task in initial {
            stack.top_mut().queue.push(task);
        }
        Self {
            domains: RefCell::new(stack),
            current_uid: Cell::new(None),
            current_timestamp: Cell::new(NO_TIMESTAMP),
        }
    }

    fn drain(&self) {
        loop {
            let next = self.domains.borrow_mut().top_mut().queue.pop_top();
            match next {
                Some(mut task) => {
                    self.current_uid.set(Some(task.assign_uid()));
                    self.current_timestamp.set(task.timestamp());
                    task.run(self);
                }
                None => {
                    let mut domains = self.domains.borrow_mut();
                    if domains.is_root() {
                        break;
                    }
                    tracing::debug!("domain drained; undeepen");
                    domains.pop_domain();
                }
            }
        }
        self.current_timestamp.set(NO_TIMESTAMP);
    }
}

impl Context for OracleContext {
    fn timestamp(&self) -> Timestamp {
        self.current_timestamp.get()
    }

    fn super_timestamp(&self) -> Timestamp {
        self.domains.borrow().super_timestamp()
    }

    fn tid(&self) -> usize {
        0
    }

    fn num_threads(&self) -> usize {
        1
    }

    fn enqueue(&self, task: Task) {
        let flags = task.hint().flags;
        let mut domains = self.domains.borrow_mut();
        if flags.contains(EnqFlags::PARENTDOMAIN) {
            domains.push_to_parent(task);
        } else if flags.contains(EnqFlags::SUPERDOMAIN) {
            domains.push_to_root(task);
        } else {
            // SUBDOMAIN targets the child domain a pending `deepen` just
            // opened, which is already `top()` by the time any task could
            // reference it — so it takes the same path as the default.
            domains.top_mut().queue.push(task);
        }
    }

    fn deepen(&self, _max_timestamp: Timestamp) {
        let super_ts = self.current_timestamp.get();
        self.domains.borrow_mut().push_domain(super_ts);
    }

    fn undeepen(&self) {
        self.domains.borrow_mut().pop_domain();
    }

    fn set_gvt(&self, _timestamp: Timestamp) {}

    fn serialize(&self) {}

    fn clear_read_set(&self) {}

    fn record_as_aborted(&self) {}
}

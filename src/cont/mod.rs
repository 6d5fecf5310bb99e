// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Continuations and the `forall` family (C12, §4.9).

mod callcc;
mod continuation;
mod forall;
mod forall_cc;
mod forall_red;

pub use callcc::callcc;
pub use continuation::{getcc, Continuation};
pub use forall::{forall, forall_ts};
pub use forall_cc::forall_cc;
pub use forall_red::forall_red;

// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;

/// Errors surfaced across the public enqueue/scheduling boundary.
///
/// Programmer-contract violations (an empty-domain-stack `undeepen`, a
/// `PARENTDOMAIN` enqueue at the root domain, …) are not represented here;
/// those panic immediately at the call site, since they indicate a bug in
/// the caller rather than a recoverable runtime condition.
#[derive(Debug)]
#[non_exhaustive]
pub enum RuntimeError {
    /// `enqueue` was called after the runtime's `stop()` was observed.
    Closed,
    /// A task was constructed with more arguments than `PLS_APP_MAX_ARGS`
    /// supports for the descriptor (spill/requeue) representation.
    ArgCountExceeded { got: usize, max: usize },
    /// `copy` was called with overlapping source and destination ranges.
    OverlappingRanges,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Closed => f.write_str("runtime was stopped"),
            RuntimeError::ArgCountExceeded { got, max } => {
                write!(f, "task has {got} arguments, descriptor path supports at most {max}")
            }
            RuntimeError::OverlappingRanges => f.write_str("source and destination ranges overlap"),
        }
    }
}

impl std::error::Error for RuntimeError {}

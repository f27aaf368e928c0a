//! Cooperative cancellation for the long running passes (unwrapping and MSD).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag polled once per outer loop iteration by the long running passes.
///
/// Clones share the same flag, so a front-end can keep one handle and hand
/// another to the computation (possibly running on a different thread).
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Result of a cancellable step. `Cancelled` is not a failure.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    Complete(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Complete(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }
}

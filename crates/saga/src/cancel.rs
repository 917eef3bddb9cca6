//! Cooperative cancellation gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// An asynchronously settable cancellation flag.
///
/// The gate may be signalled at any wall-clock time from any task; the
/// saga observes it only at the safe points between steps, never mid-call.
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationGate {
    flag: Arc<AtomicBool>,
}

impl CancellationGate {
    /// Creates a new, unsignalled gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent; may be called any number of times.
    pub fn signal_cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

//! Cancellation tokens for backend gathering work.
//!
//! Backends that enumerate on a worker thread hold a token and poll it while
//! walking. `stop()` on the query handle flips the shared flag.
//!
//! Walk loops call `is_cancelled_sparse()` with their entry counter so the
//! flag is read once per `CANCEL_CHECK_INTERVAL` entries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Entries between flag reads in walk loops. Must stay a power of two.
pub const CANCEL_CHECK_INTERVAL: usize = 1 << 10;

/// A cancellation token shared between a query handle and its worker.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token nobody holds a cancelling handle for.
    pub fn noop() -> Self {
        Self::default()
    }

    /// Marks the token as cancelled. Returns `true` only for the first call.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    /// `None` once cancelled, so workers can bail out with `?`.
    #[inline]
    pub fn is_cancelled(&self) -> Option<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            None
        } else {
            Some(())
        }
    }

    /// Like [`is_cancelled`](Self::is_cancelled), but only reads the flag
    /// when `counter` is a multiple of [`CANCEL_CHECK_INTERVAL`].
    #[inline]
    pub fn is_cancelled_sparse(&self, counter: usize) -> Option<()> {
        if counter & (CANCEL_CHECK_INTERVAL - 1) == 0 {
            self.is_cancelled()
        } else {
            Some(())
        }
    }
}

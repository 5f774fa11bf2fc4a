//! Cancellation token for extraction runs
//!
//! Each run gets a fresh token owned by its [`super::ExtractionSession`].
//! The pipeline checks it before starting a page and again before
//! publishing, so cancellation stops at a page boundary and a page that
//! resolves late is discarded.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cooperative cancellation flag
///
/// Clones observe the same state. Cancelling is idempotent and a cancelled
/// token is never reset: a new run creates a new token.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

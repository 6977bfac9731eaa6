//! Cooperative cancellation
//!
//! Long-running transforms poll a [`CancellationToken`] at their stage
//! boundaries. The token is set at most once and never cleared.

use crate::error::{ProcessingError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, set-once cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`ProcessingError::Cancelled`] once the token is signaled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ProcessingError::Cancelled)
        } else {
            Ok(())
        }
    }
}

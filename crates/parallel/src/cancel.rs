//! Cooperative cancellation

use sei_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked between pipeline stages and tiles.
///
/// Clones observe the same flag, so one token handed to every scenario of
/// a run cancels all of them, while separate tokens cancel one scenario.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once the token has been cancelled
    pub fn check(&self, scope: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled(scope.to_string()));
        }
        Ok(())
    }
}

//! Cancellation signal for ledger queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::infrastructure::error::LedgerError;

/// Caller-owned cancellation flag with an optional deadline.
///
/// Clones share the flag, so cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Err if the caller cancelled or the deadline passed.
    pub fn check(&self) -> Result<(), LedgerError> {
        if self.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(LedgerError::Timeout),
            _ => Ok(()),
        }
    }
}

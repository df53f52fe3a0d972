//! Cancellation
//!
//! Caller-supplied deadline and cancel flag for operations that may block
//! on disk I/O (eviction writes during commit, disk reads during load).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ForkStoreError, Result};

/// Deadline and/or cancel flag checked at safe points
///
/// Clones share the same flag, so one clone can cancel an operation
/// running with another.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// Never cancels unless `cancel()` is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels once `timeout` has elapsed from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Cancels at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Cancelled` if the flag is set or the deadline passed
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ForkStoreError::Cancelled(stage.to_string()));
        }
        Ok(())
    }
}

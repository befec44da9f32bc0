//! Caller-supplied cancellation for blocking insert and search calls.
//!
//! A [`CancelToken`] is checked at every suspension point (embedding calls and
//! the index round-trip). Clones share the same flag, so a token handed to a
//! worker can be cancelled from another thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Operation cancelled: {reason}")]
pub struct Cancelled {
    pub reason: String,
}

impl Cancelled {
    pub fn requested() -> Self {
        Self {
            reason: "cancellation requested".to_string(),
        }
    }

    pub fn deadline() -> Self {
        Self {
            reason: "deadline exceeded".to_string(),
        }
    }
}

/// Cooperative cancellation flag with an optional deadline
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Token that only trips on an explicit [`CancelToken::cancel`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that trips once `deadline` has passed
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Token that trips `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Returns `Err(Cancelled)` once the token was cancelled or its deadline passed
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.flag.load(Ordering::SeqCst) {
            return Err(Cancelled::requested());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Cancelled::deadline()),
            _ => Ok(()),
        }
    }
}

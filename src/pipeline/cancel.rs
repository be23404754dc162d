//! Cooperative cancellation for a processing run.
//!
//! A token is created per run from the request's runtime ceiling and
//! checked between pipeline stages and between page batches. Cancellation
//! is cooperative only; an in-flight backend call is not interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag plus a wall-clock deadline.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Token with a deadline `max_runtime_s` from now. A ceiling of zero
    /// means no deadline.
    pub fn with_deadline(max_runtime_s: u64) -> Self {
        let deadline = if max_runtime_s == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(max_runtime_s))
        };
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline,
        }
    }

    /// Token that never expires on its own.
    pub fn unbounded() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True if cancelled explicitly or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(d) => Instant::now() >= d,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        let token = CancelToken::unbounded();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::unbounded();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn zero_ceiling_means_no_deadline() {
        let token = CancelToken::with_deadline(0);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn expired_deadline_cancels() {
        let token = CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() - Duration::from_secs(1)),
        };
        assert!(token.is_cancelled());
    }
}

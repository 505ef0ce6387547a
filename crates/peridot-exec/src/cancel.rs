//! Cancellation tokens carried into every database call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ExecError;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

/// A cheap cloneable cancel flag plus optional deadline.
///
/// Executors check the token at call boundaries; a blocking server call
/// already in flight is bounded by the server-side statement timeout the
/// run configures, not by this token.
#[derive(Debug, Clone)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

impl Cancellation {
    /// A token that never fires on its own.
    pub fn unbounded() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
            }),
        }
    }

    /// A token that fires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// Fires the token by hand.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline_passed(&self) -> bool {
        self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Gate for executors: `Err` when the call must not be issued.
    pub fn check(&self) -> Result<(), ExecError> {
        if self.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        if self.deadline_passed() {
            return Err(ExecError::Timeout);
        }
        Ok(())
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_fires() {
        let t = Cancellation::unbounded();
        assert!(t.check().is_ok());
        assert!(!t.is_cancelled());
    }

    #[test]
    fn manual_cancel_fires() {
        let t = Cancellation::unbounded();
        let clone = t.clone();
        clone.cancel();
        assert!(matches!(t.check(), Err(ExecError::Cancelled)));
    }

    #[test]
    fn expired_deadline_fires() {
        let t = Cancellation::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(t.check(), Err(ExecError::Timeout)));
    }
}

//! A cloneable handle for poking a session from external code.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle for poking a session from external code.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct SessionHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    is_running: Arc<AtomicBool>,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort the in-flight submit, if any.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Whether a submit is in flight.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Claim the busy flag. Returns `None` if another submit holds it.
    pub(crate) fn try_begin(&self) -> Option<RunGuard> {
        self.is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        Some(RunGuard {
            handle: self.clone(),
            token,
        })
    }
}

/// Holds the busy flag for one submit; releases it on drop.
pub(crate) struct RunGuard {
    handle: SessionHandle,
    token: CancellationToken,
}

impl RunGuard {
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.handle.is_running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_claim() {
        let handle = SessionHandle::new();
        let guard = handle.try_begin().unwrap();
        assert!(handle.is_running());
        assert!(handle.clone().try_begin().is_none());

        drop(guard);
        assert!(!handle.is_running());
        assert!(handle.try_begin().is_some());
    }

    #[test]
    fn test_abort_cancels_current_run_only() {
        let handle = SessionHandle::new();
        let first = handle.try_begin().unwrap();
        handle.abort();
        assert!(first.token().is_cancelled());
        drop(first);

        let second = handle.try_begin().unwrap();
        assert!(!second.token().is_cancelled());
    }
}

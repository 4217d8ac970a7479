use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Broadcast cancellation signal shared between the watch loop, the
/// process supervisor, and the interrupt handler.
///
/// Unlike a closed channel, cancelling is idempotent: any number of
/// holders may call [`CancelToken::cancel`] in any order. Every waiter
/// blocked in [`CancelToken::wait`] or [`CancelToken::wait_timeout`] is
/// woken by the first cancel.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation. Safe to call more than once.
    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cancelled = true;
        self.inner.condvar.notify_all();
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks the caller until the token is cancelled.
    pub fn wait(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while !*cancelled {
            cancelled = self
                .inner
                .condvar
                .wait(cancelled)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Blocks for at most `timeout`; returns true if the token was
    /// cancelled before the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *cancelled {
            return true;
        }
        let (cancelled, _) = self
            .inner
            .condvar
            .wait_timeout(cancelled, timeout)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cancelled
    }
}

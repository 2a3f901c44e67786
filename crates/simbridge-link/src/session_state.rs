//! [`SessionState`] – the only state shared between the two channels.
//!
//! `done` starts `false` and flips to `true` exactly once.  Whoever flips it
//! (a channel reaching a terminal condition, or an external stop request)
//! learns that it was first from the return value of
//! [`finish`][SessionState::finish]; every later call is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Write-once shutdown flag plus a wake-up for tasks parked in an unbounded
/// wait (the image accept and the first telemetry read).
#[derive(Debug, Default)]
pub struct SessionState {
    done: AtomicBool,
    notify: Notify,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking query of the shared flag.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Set `done`.  Returns `true` only for the call that performed the
    /// transition.
    pub fn finish(&self) -> bool {
        let first = !self.done.swap(true, Ordering::SeqCst);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    /// Resolve once `done` is set.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a concurrent `finish` is not missed.
        notified.as_mut().enable();
        if self.is_done() {
            return;
        }
        notified.await;
    }
}

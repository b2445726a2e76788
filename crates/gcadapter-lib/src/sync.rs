//! Wake signals for the worker threads.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Auto-reset wake signal: `wait` blocks until some thread calls `set`, then
/// consumes the signal. Repeated `set` calls before a `wait` coalesce into
/// one wake-up, which is exactly what the rumble staging area needs — newer
/// payloads overwrite the pending one rather than queueing.
#[derive(Default)]
pub struct Event {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the event, waking one waiter.
    pub fn set(&self) {
        let mut signalled = self.signalled.lock().unwrap_or_else(|e| e.into_inner());
        *signalled = true;
        self.cond.notify_one();
    }

    /// Clear a pending signal without waking anyone.
    pub fn reset(&self) {
        let mut signalled = self.signalled.lock().unwrap_or_else(|e| e.into_inner());
        *signalled = false;
    }

    /// Block until signalled, then consume the signal.
    pub fn wait(&self) {
        let mut signalled = self.signalled.lock().unwrap_or_else(|e| e.into_inner());
        while !*signalled {
            signalled = self.cond.wait(signalled).unwrap_or_else(|e| e.into_inner());
        }
        *signalled = false;
    }

    /// Block until signalled or `timeout` elapses. Returns `true` if the
    /// signal was consumed, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signalled = self.signalled.lock().unwrap_or_else(|e| e.into_inner());
        let deadline = std::time::Instant::now() + timeout;
        while !*signalled {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self
                .cond
                .wait_timeout(signalled, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            signalled = guard;
            if result.timed_out() && !*signalled {
                return false;
            }
        }
        *signalled = false;
        true
    }
}

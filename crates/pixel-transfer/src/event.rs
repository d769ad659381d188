//! Manual-reset event used as the transfer completion signal.

use parking_lot::{Condvar, Mutex};

/// Stays signaled until explicitly reset; every waiter wakes on [`signal`].
///
/// [`signal`]: CompletionEvent::signal
pub(crate) struct CompletionEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl CompletionEvent {
    pub(crate) fn new(signaled: bool) -> Self {
        Self {
            signaled: Mutex::new(signaled),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn signal(&self) {
        *self.signaled.lock() = true;
        self.cond.notify_all();
    }

    pub(crate) fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub(crate) fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    pub(crate) fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
    }
}

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Owner side of a cancellation signal.
///
/// Cloning the controller or its [`AbortSignal`] shares the same underlying
/// state; aborting any clone is observed by every signal.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Fires the signal and wakes every pending [`AbortSignal::aborted`] waiter.
    /// Calling this more than once has no further effect.
    pub fn abort(&self) {
        let already_aborted = self.signal.state.aborted.swap(true, Ordering::SeqCst);
        if !already_aborted {
            self.signal.state.notify.notify_waiters();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}

/// Observer side of a cancellation signal.
///
/// A default-constructed signal has no controller and never fires.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once the signal has fired. Resolves immediately if it already has.
    pub async fn aborted(&self) {
        let mut notified = pin!(self.state.notify.notified());

        // Register interest before checking the flag so an `abort()` racing
        // with this call cannot be missed.
        notified.as_mut().enable();

        if self.is_aborted() {
            return;
        }

        notified.await;
    }
}

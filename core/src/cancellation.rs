//! Cancellation primitive — token/source pair with one-shot listener
//! notification.
//!
//! The flag is monotonic: once cancelled, never reset. Listeners
//! registered before cancellation are notified synchronously, exactly
//! once, by the first `cancel()`. Listeners registered afterwards are
//! never invoked; the flag alone governs late observers (poll with
//! [`CancellationToken::is_cancellation_requested`]).

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Listener = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Shared {
    cancelled: AtomicBool,
    listeners: Mutex<Vec<Listener>>,
}

impl Shared {
    fn listeners(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self) {
        // The flag flips and the listener list drains under the same
        // lock, so a listener registered concurrently either fires here
        // or observes the flag — never neither.
        let pending = {
            let mut listeners = self.listeners();
            if self.cancelled.swap(true, Ordering::SeqCst) {
                return;
            }
            mem::take(&mut *listeners)
        };
        for listener in pending {
            listener();
        }
    }
}

/// Creates and cancels exactly one [`CancellationToken`].
///
/// Created per logical operation and discarded after use.
pub struct CancellationTokenSource {
    shared: Arc<Shared>,
}

impl CancellationTokenSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    /// A source whose token is cancelled whenever `parent` is.
    ///
    /// Propagation is downward only; cancelling the child never touches
    /// the parent. The subscription lives as long as the parent token.
    #[must_use]
    pub fn with_parent(parent: &CancellationToken) -> Self {
        let source = Self::new();
        if parent.is_cancellation_requested() {
            source.shared.cancel();
        } else {
            let shared = source.shared.clone();
            parent.on_cancellation_requested(move || shared.cancel());
        }
        source
    }

    /// The token governed by this source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            shared: self.shared.clone(),
        }
    }

    /// Flip the flag and notify listeners. Idempotent — a second call
    /// is a no-op.
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a [`CancellationTokenSource`].
#[derive(Clone)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

impl CancellationToken {
    /// Whether cancellation has been requested. Monotonic false→true.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Register a listener fired synchronously by the first `cancel()`.
    ///
    /// If the token is already cancelled the listener is dropped
    /// without firing; callers observe the flag instead.
    pub fn on_cancellation_requested(&self, listener: impl FnOnce() + Send + 'static) {
        let mut listeners = self.shared.listeners();
        if self.shared.cancelled.load(Ordering::SeqCst) {
            return;
        }
        listeners.push(Box::new(listener));
    }
}

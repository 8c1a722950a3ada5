//! Observer-list event bus.
//!
//! A minimal register/unregister/fire abstraction used for the proxy's
//! global listener set, per-call progress sinks, the dispatcher's
//! worker-side event target, and state-change listeners. Independent of
//! any host-runtime event API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::mpsc;

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A set of listeners for events of type `E`.
///
/// Listeners are invoked in registration order. `fire` snapshots the
/// list first, so a listener may register or remove listeners without
/// deadlocking; changes take effect from the next `fire`.
pub struct EventBus<E> {
    listeners: Mutex<Vec<(ListenerId, Callback<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Callback<E>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener and return its removal handle.
    pub fn add_listener(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Deliver `event` to every currently-registered listener.
    pub fn fire(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .listeners()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Register a forwarding listener and return the receiving end.
    ///
    /// Dropping the receiver unregisters the listener lazily: the
    /// first `fire` that fails to deliver removes it from the bus.
    pub fn subscribe(self: &Arc<Self>) -> (ListenerId, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Arc::downgrade(self);
        let slot = Arc::new(OnceLock::new());
        let own_id = slot.clone();
        let id = self.add_listener(move |event: &E| {
            if tx.send(event.clone()).is_err()
                && let (Some(bus), Some(id)) = (bus.upgrade(), own_id.get())
            {
                bus.remove_listener(*id);
            }
        });
        let _ = slot.set(id);
        (id, rx)
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

//! Change events and listener fan-out.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A summary of which queries a write batch affected.
///
/// Caches refresh the collection, the single row, or the parent group a
/// hint names. Hints are deduplicated per emission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvalidationHint {
    /// The affected collection.
    pub collection_id: String,
    /// The affected row, when a single row changed.
    pub id: Option<String>,
    /// The affected parent group, when the row was grouped.
    pub parent_id: Option<String>,
}

/// Where a change batch originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// A local write through the engine.
    Local,
    /// Rows applied from the server (pull page or pushed event).
    Remote,
}

/// An event emitted after a batch of rows applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Where the batch originated.
    pub source: ChangeSource,
    /// Deduplicated hints for the rows that actually changed.
    pub invalidation_hints: Vec<InvalidationHint>,
}

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    listeners: RwLock<HashMap<u64, Listener<E>>>,
    next_id: AtomicU64,
}

impl<E> Registry<E> {
    fn remove(&self, id: u64) {
        self.listeners.write().remove(&id);
    }
}

/// A set of subscribed listeners.
///
/// Listeners are invoked synchronously, in no particular order, on the
/// emitting thread. A panicking listener is isolated so the remaining
/// listeners still run.
pub struct ListenerSet<E> {
    registry: Arc<Registry<E>>,
}

impl<E: 'static> Default for ListenerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> ListenerSet<E> {
    /// Creates an empty listener set.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                listeners: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a listener; dropping the returned handle unsubscribes.
    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst);
        self.registry.listeners.write().insert(id, Arc::new(listener));

        let registry = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = Weak::upgrade(&registry) {
                registry.remove(id);
            }
        })
    }

    /// Invokes every listener with the event.
    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> =
            self.registry.listeners.read().values().cloned().collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!("listener panicked during event dispatch");
            }
        }
    }

    /// Returns the number of active listeners.
    pub fn len(&self) -> usize {
        self.registry.listeners.read().len()
    }

    /// Returns true when no listener is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A handle that removes its listener when dropped or unsubscribed.
///
/// The handle holds no reference to the listener's owner; it only knows
/// how to detach the listener from the registry.
pub struct Subscription {
    cancel: parking_lot::Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Wraps a cancellation action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: parking_lot::Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A handle that detaches nothing.
    pub fn noop() -> Self {
        Self {
            cancel: parking_lot::Mutex::new(None),
        }
    }

    /// Removes the listener now.
    pub fn unsubscribe(self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_reaches_all_listeners() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&calls);
        let _s1 = set.subscribe(move |v| {
            assert_eq!(*v, 42);
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&calls);
        let _s2 = set.subscribe(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        set.emit(&42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_detaches() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let sub = set.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(set.len(), 1);

        sub.unsubscribe();
        assert_eq!(set.len(), 0);

        set.emit(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_handle_detaches() {
        let set: ListenerSet<u32> = ListenerSet::new();
        {
            let _sub = set.subscribe(|_| {});
            assert_eq!(set.len(), 1);
        }
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _bad = set.subscribe(|_| panic!("listener bug"));
        let c = Arc::clone(&calls);
        let _good = set.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        set.emit(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

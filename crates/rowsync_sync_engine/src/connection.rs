//! Connection state machine.

use parking_lot::Mutex;
use rowsync_core::{ListenerSet, Subscription};
use std::sync::Arc;

/// The connectivity of a node, as reported by its platform driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No usable network path.
    Offline,
    /// Online and authenticated; syncing may proceed.
    Connected,
    /// Online but the server rejected the credentials.
    NeedsAuth,
    /// Syncing suspended by the application.
    Paused,
}

/// A platform connectivity driver.
///
/// Drivers wrap OS visibility and network events. A driver must invoke
/// the listener with the current state immediately on subscription and
/// once per state change thereafter.
pub trait ConnectionDriver: Send + Sync {
    /// Registers a state listener; dropping the handle unsubscribes.
    fn subscribe(
        &self,
        listener: Box<dyn Fn(ConnectionState) + Send + Sync>,
    ) -> Subscription;
}

/// A manually driven connection driver.
///
/// The reference driver and test double: the application (or test) feeds
/// states in with [`ManualDriver::set_state`].
pub struct ManualDriver {
    state: Mutex<ConnectionState>,
    listeners: ListenerSet<ConnectionState>,
}

impl ManualDriver {
    /// Creates a driver reporting the given initial state.
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            state: Mutex::new(initial),
            listeners: ListenerSet::new(),
        }
    }

    /// Reports a state to all subscribers.
    ///
    /// The driver forwards every report verbatim; deduplication is the
    /// manager's job.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
        self.listeners.emit(&state);
    }
}

impl Default for ManualDriver {
    fn default() -> Self {
        Self::new(ConnectionState::Offline)
    }
}

impl ConnectionDriver for ManualDriver {
    fn subscribe(
        &self,
        listener: Box<dyn Fn(ConnectionState) + Send + Sync>,
    ) -> Subscription {
        let current = *self.state.lock();
        listener(current);
        self.listeners.subscribe(move |state| listener(*state))
    }
}

/// Holds the latest connection state and fans out changes.
///
/// The manager subscribes to its driver once, forwards transitions only
/// when the state actually changed, and isolates listener panics from
/// one another.
pub struct ConnectionManager {
    state: Arc<Mutex<ConnectionState>>,
    listeners: Arc<ListenerSet<ConnectionState>>,
    _driver_subscription: Subscription,
}

impl ConnectionManager {
    /// Creates a manager over the given driver.
    pub fn new(driver: &dyn ConnectionDriver) -> Self {
        let state = Arc::new(Mutex::new(ConnectionState::Offline));
        let listeners: Arc<ListenerSet<ConnectionState>> = Arc::new(ListenerSet::new());

        let held_state = Arc::clone(&state);
        let held_listeners = Arc::clone(&listeners);
        let driver_subscription = driver.subscribe(Box::new(move |new_state| {
            let mut current = held_state.lock();
            if *current == new_state {
                return;
            }
            *current = new_state;
            drop(current);
            held_listeners.emit(&new_state);
        }));

        Self {
            state,
            listeners,
            _driver_subscription: driver_subscription,
        }
    }

    /// Returns the latest known state.
    pub fn get_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Registers a listener for state changes.
    pub fn subscribe(
        &self,
        listener: impl Fn(&ConnectionState) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

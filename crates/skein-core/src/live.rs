//! Push-based live values.
//!
//! [`LiveSource`] is the store-facing primitive: a value that calls every
//! registered observer on each change and keeps calling it until the observer
//! is explicitly removed. Consumers never use it directly; they go through the
//! [`bridge`](crate::bridge), which turns it into a disposable subscription.
//!
//! [`LiveCell`] is the in-process implementation used by
//! [`MemoryStore`](crate::store::MemoryStore) and the draft repository.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback registered with a live source. `None` means "no value".
pub type Observer<T> = Arc<dyn Fn(Option<T>) + Send + Sync>;

/// Handle identifying one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// A value that pushes every change to its observers until they are removed.
///
/// # Contract
///
/// - `observe_forever` calls the observer once with the current value before
///   returning, then again on every change
/// - Observers may be called from whichever thread performed the change
/// - After `remove_observer` returns, the observer is never called again
pub trait LiveSource<T>: Send + Sync {
    /// Register an observer.
    fn observe_forever(&self, observer: Observer<T>) -> ObserverId;

    /// Unregister an observer. Unknown ids are ignored.
    fn remove_observer(&self, id: ObserverId);

    /// Number of registered observers.
    fn observer_count(&self) -> usize;
}

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every structure guarded this way stays consistent between statements, so a
/// poisoned lock carries no torn state.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CellState<T> {
    value: Option<T>,
    observers: Vec<(ObserverId, Observer<T>)>,
    next_id: u64,
}

/// In-memory [`LiveSource`].
///
/// Notifications are serialized: two concurrent `set` calls notify observers
/// in the same order they updated the value.
pub struct LiveCell<T> {
    state: Mutex<CellState<T>>,
    /// Held while notifying so observers see changes in update order.
    notify: Mutex<()>,
}

impl<T: Clone + Send + 'static> LiveCell<T> {
    /// Create a cell holding `value`.
    pub fn new(value: Option<T>) -> Self {
        Self {
            state: Mutex::new(CellState { value, observers: Vec::new(), next_id: 0 }),
            notify: Mutex::new(()),
        }
    }

    /// Current value.
    pub fn get(&self) -> Option<T> {
        lock_unpoisoned(&self.state).value.clone()
    }

    /// Replace the value and notify every observer.
    pub fn set(&self, value: Option<T>) {
        let _order = lock_unpoisoned(&self.notify);
        let observers = {
            let mut state = lock_unpoisoned(&self.state);
            state.value.clone_from(&value);
            state.observers.iter().map(|(_, o)| Arc::clone(o)).collect::<Vec<_>>()
        };

        for observer in observers {
            observer(value.clone());
        }
    }

    /// Replace the value only if it differs. Returns whether it changed.
    pub fn set_if_changed(&self, value: Option<T>) -> bool
    where
        T: PartialEq,
    {
        if lock_unpoisoned(&self.state).value == value {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T: Clone + Send + 'static> Default for LiveCell<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T: Clone + Send + 'static> LiveSource<T> for LiveCell<T> {
    fn observe_forever(&self, observer: Observer<T>) -> ObserverId {
        let _order = lock_unpoisoned(&self.notify);
        let (id, current) = {
            let mut state = lock_unpoisoned(&self.state);
            let id = ObserverId(state.next_id);
            state.next_id += 1;
            state.observers.push((id, Arc::clone(&observer)));
            (id, state.value.clone())
        };

        observer(current);
        id
    }

    fn remove_observer(&self, id: ObserverId) {
        lock_unpoisoned(&self.state).observers.retain(|(oid, _)| *oid != id);
    }

    fn observer_count(&self) -> usize {
        lock_unpoisoned(&self.state).observers.len()
    }
}

impl<T> std::fmt::Debug for LiveCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let observers = lock_unpoisoned(&self.state).observers.len();
        f.debug_struct("LiveCell").field("observers", &observers).finish_non_exhaustive()
    }
}

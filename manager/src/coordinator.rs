//! Availability gate and mutual exclusion for store access.
//!
//! A single monitor (`Mutex` + `Condvar`) guards the availability state, the
//! busy flag and the published store handle. Every transition happens under
//! the lock and is followed by `notify_all`; waiters re-check their predicate
//! after each wakeup. Waiters are not served in arrival order.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Where the store is in its one-way opening sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Availability {
    Uninitialized,
    Loading,
    Available,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Availability::Uninitialized => "uninitialized",
            Availability::Loading => "loading",
            Availability::Available => "available",
        };
        f.write_str(name)
    }
}

struct Gate<S> {
    availability: Availability,
    busy: bool,
    store: Option<Arc<S>>,
}

/// Gates readers and writers on the availability of a published store `S`,
/// and lets at most one exclusive holder in at a time.
pub struct AccessCoordinator<S> {
    gate: Mutex<Gate<S>>,
    changed: Condvar,
}

impl<S> Default for AccessCoordinator<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> AccessCoordinator<S> {
    pub fn new() -> Self {
        Self {
            gate: Mutex::new(Gate {
                availability: Availability::Uninitialized,
                busy: false,
                store: None,
            }),
            changed: Condvar::new(),
        }
    }

    // The gate is only ever updated by single field assignments, so a
    // poisoned lock still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, Gate<S>> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn availability(&self) -> Availability {
        self.lock().availability
    }

    /// Move from `Uninitialized` to `Loading`.
    ///
    /// Returns `false` if opening was already requested, so the caller must
    /// not start another one.
    pub fn begin_loading(&self) -> bool {
        let mut gate = self.lock();
        if gate.availability != Availability::Uninitialized {
            return false;
        }
        gate.availability = Availability::Loading;
        drop(gate);
        self.changed.notify_all();
        true
    }

    /// Publish the opened store and wake everyone waiting for it.
    pub fn publish(&self, store: Arc<S>) {
        let mut gate = self.lock();
        gate.store = Some(store);
        gate.availability = Availability::Available;
        drop(gate);
        self.changed.notify_all();
    }

    /// The published store, without waiting.
    pub fn try_store(&self) -> Option<Arc<S>> {
        self.lock().store.clone()
    }

    /// Block until the store is available and return it.
    pub fn wait_available(&self) -> Arc<S> {
        let mut gate = self.lock();
        loop {
            if let Some(store) = &gate.store {
                return Arc::clone(store);
            }
            gate = self.wait(gate);
        }
    }

    /// Block until the store is available and nobody else holds exclusive
    /// access, then take it. Access is released when the guard drops.
    pub fn acquire_exclusive(&self) -> ExclusiveGuard<'_, S> {
        let mut gate = self.lock();
        loop {
            if !gate.busy {
                if let Some(store) = gate.store.clone() {
                    gate.busy = true;
                    return ExclusiveGuard {
                        coordinator: self,
                        store,
                    };
                }
            }
            gate = self.wait(gate);
        }
    }

    fn wait<'g>(&self, gate: MutexGuard<'g, Gate<S>>) -> MutexGuard<'g, Gate<S>> {
        self.changed
            .wait(gate)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut gate = self.lock();
        gate.busy = false;
        drop(gate);
        self.changed.notify_all();
    }
}

/// Sole mutation rights over the store for as long as it lives.
///
/// Dropping the guard clears the busy flag on every exit path, including
/// unwinding out of a panicking task.
pub struct ExclusiveGuard<'a, S> {
    coordinator: &'a AccessCoordinator<S>,
    store: Arc<S>,
}

impl<S> ExclusiveGuard<'_, S> {
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> Drop for ExclusiveGuard<'_, S> {
    fn drop(&mut self) {
        self.coordinator.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn transitions_only_move_forward() {
        let coordinator = AccessCoordinator::<u32>::new();
        assert_eq!(coordinator.availability(), Availability::Uninitialized);
        assert!(coordinator.begin_loading());
        assert!(!coordinator.begin_loading());
        assert_eq!(coordinator.availability(), Availability::Loading);
        coordinator.publish(Arc::new(7));
        assert!(!coordinator.begin_loading());
        assert_eq!(coordinator.availability(), Availability::Available);
    }

    #[test]
    fn waiters_wake_on_publish() {
        let coordinator = Arc::new(AccessCoordinator::<u32>::new());
        coordinator.begin_loading();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&coordinator);
                thread::spawn(move || *c.wait_available())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert!(coordinator.try_store().is_none());
        coordinator.publish(Arc::new(42));

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), 42);
        }
    }

    #[test]
    fn exclusive_holders_never_overlap() {
        let coordinator = Arc::new(AccessCoordinator::<()>::new());
        coordinator.publish(Arc::new(()));
        let inside = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&coordinator);
                let inside = Arc::clone(&inside);
                let entered = Arc::clone(&entered);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let _guard = c.acquire_exclusive();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        entered.fetch_add(1, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(entered.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn panicking_holder_releases_access() {
        let coordinator = Arc::new(AccessCoordinator::<()>::new());
        coordinator.publish(Arc::new(()));

        let c = Arc::clone(&coordinator);
        let result = thread::spawn(move || {
            let _guard = c.acquire_exclusive();
            panic!("task failed");
        })
        .join();
        assert!(result.is_err());

        drop(coordinator.acquire_exclusive());
    }

    #[test]
    fn display_names() {
        assert_eq!(Availability::Loading.to_string(), "loading");
    }
}

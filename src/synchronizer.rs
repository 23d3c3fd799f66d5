//! # Keyed mutex registry.
//!
//! [`Synchronizer`] hands out a stable [`Monitor`] (mutex + condvar pair) per
//! string id. Two callers asking for the same id observe the same monitor
//! object until it is removed, which is what makes instance-keyed wait points
//! ("`{executor}:resume`", "`{supplier}:slot[3]`", …) possible without every
//! component owning a zoo of lock fields.
//!
//! ## Rules
//! - [`Synchronizer::mutex`] inserts on first use and returns the shared
//!   monitor; the entry lives until [`Synchronizer::remove`] (or
//!   [`Synchronizer::execute`], which removes its id when done).
//! - [`Synchronizer::execute`] runs a closure while holding the monitor for
//!   `id`, then drops the registry entry. Use it for one-shot critical
//!   sections such as publishing into a sleeping slot.
//! - Waiters must re-check their condition after every wake: notifications
//!   carry no payload and wakes may be spurious.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};

/// A mutex/condvar pair usable as a monitor: lock it, check a condition,
/// wait or notify.
#[derive(Default)]
pub struct Monitor {
    lock: Mutex<()>,
    cond: Condvar,
}

impl Monitor {
    /// Creates a fresh monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the monitor.
    pub fn enter(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// Releases the monitor and blocks until notified.
    pub fn wait(&self, guard: &mut MutexGuard<'_, ()>) {
        self.cond.wait(guard);
    }

    /// Releases the monitor and blocks until notified or `timeout` elapses.
    /// Returns `true` when the wait timed out.
    pub fn wait_for(&self, guard: &mut MutexGuard<'_, ()>, timeout: Duration) -> bool {
        self.cond.wait_for(guard, timeout).timed_out()
    }

    /// Wakes one waiter. Callers should hold the monitor while the condition
    /// they signal is mutated.
    pub fn notify_one(&self) {
        self.cond.notify_one();
    }

    /// Wakes all waiters.
    pub fn notify_all(&self) {
        self.cond.notify_all();
    }
}

/// Registry of [`Monitor`]s keyed by string id.
///
/// Cheap to share: clone the `Arc` around it. Ids are conventionally
/// `"{instance}:{concern}"` so distinct components never collide.
pub struct Synchronizer {
    monitors: DashMap<String, Arc<Monitor>>,
}

impl Synchronizer {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            monitors: DashMap::new(),
        })
    }

    /// Returns the shared monitor for `id`, creating it on first use.
    pub fn mutex(&self, id: &str) -> Arc<Monitor> {
        if let Some(existing) = self.monitors.get(id) {
            return Arc::clone(existing.value());
        }
        self.monitors
            .entry(id.to_owned())
            .or_insert_with(|| Arc::new(Monitor::new()))
            .clone()
    }

    /// Runs `f` while holding the monitor for `id`, then removes the entry.
    ///
    /// The monitor object itself stays alive as long as someone still holds
    /// an `Arc` to it; only the id binding is dropped.
    pub fn execute<R>(&self, id: &str, f: impl FnOnce() -> R) -> R {
        let monitor = self.mutex(id);
        let result = {
            let _guard = monitor.enter();
            f()
        };
        self.monitors.remove(id);
        result
    }

    /// Drops the entry for `id`, if any.
    pub fn remove(&self, id: &str) {
        self.monitors.remove(id);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// True when no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.monitors.clear();
    }
}

//! # Thread supplier: hybrid pool of poolable and detached workers.
//!
//! [`ThreadSupplier`] hands out workers on demand:
//!
//! 1. a parked poolable worker, taken from the sleeping-slot array;
//! 2. a fresh poolable worker, while the poolable bound allows;
//! 3. a fresh detached worker, while the total bound allows;
//! 4. otherwise a bounded wait on the sleeping-array monitor. A timely wake
//!    retries (and may decay an inflated cap after quiescence); a timeout
//!    grows the detached cap by the configured step and retries with a
//!    decremented request budget.
//!
//! ```text
//! get_or_create()
//!     │
//!     ├──► sleeping slots ──► parked worker (freshness-checked)
//!     ├──► poolable < max_poolable ──► new poolable
//!     ├──► total < max_total ──► new detached
//!     └──► wait(request_timeout)
//!           ├──► timely wake ──► maybe decay cap, retry
//!           └──► timeout ──► max_total += step, retry (budget - 1)
//! ```
//!
//! ## Rules
//! - Slot publishes are guarded by a keyed mutex named with the slot index,
//!   so only one producer fills a slot observed empty.
//! - A slot occupant must be observed parked before it is handed out; any
//!   other state marks it defective: it is interrupted and scanning
//!   continues.
//! - Successive scans alternate forward and reverse direction to spread
//!   contention across the array.
//! - Worker completion paths wake the **notifier**, a lazily created
//!   max-priority detached worker whose only job is to re-notify waiters on
//!   the sleeping-array monitor. This decouples worker exits from contention
//!   on the supplier's primary monitor.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::{Properties, SupplierSettings};
use crate::error::RuntimeError;
use crate::pool::worker::{Job, Worker, WorkerKind};
use crate::priority::Priority;
use crate::synchronizer::{Monitor, Synchronizer};

/// Allocates and recycles [`Worker`]s under configured bounds, growing the
/// detached cap under contention and decaying it back after quiescence.
pub struct ThreadSupplier {
    name: String,
    daemon: bool,
    max_poolable: usize,
    initial_max_total: usize,
    max_total: AtomicUsize,
    increasing_step: usize,
    request_timeout: std::time::Duration,
    decay_threshold: std::time::Duration,
    threads_count: AtomicUsize,
    poolable_count: AtomicUsize,
    /// `None` is the sentinel "no growth to decay".
    last_growth: Mutex<Option<Instant>>,
    sleeping: Box<[Mutex<Option<Worker>>]>,
    sleeping_monitor: Monitor,
    running: DashMap<usize, Worker>,
    notifier: Mutex<Option<Worker>>,
    synchronizer: Arc<Synchronizer>,
    take_scan_reversed: AtomicBool,
    add_scan_reversed: AtomicBool,
    next_index: AtomicUsize,
}

impl ThreadSupplier {
    /// Creates a supplier from a string-properties map.
    pub fn create(name: impl Into<String>, props: &Properties) -> Result<Arc<Self>, RuntimeError> {
        Self::from_settings(name, SupplierSettings::from_properties(props)?)
    }

    /// Creates a supplier from already-built settings.
    pub fn from_settings(
        name: impl Into<String>,
        settings: SupplierSettings,
    ) -> Result<Arc<Self>, RuntimeError> {
        settings.validate()?;
        let max_poolable = settings.resolved_max_poolable();
        let max_total = max_poolable.saturating_add(settings.resolved_max_detached());
        let sleeping = (0..max_poolable)
            .map(|_| Mutex::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Arc::new(Self {
            name: name.into(),
            daemon: settings.daemon,
            max_poolable,
            initial_max_total: max_total,
            max_total: AtomicUsize::new(max_total),
            increasing_step: settings.increasing_step,
            request_timeout: settings.request_timeout,
            decay_threshold: settings.decay_threshold,
            threads_count: AtomicUsize::new(0),
            poolable_count: AtomicUsize::new(0),
            last_growth: Mutex::new(None),
            sleeping,
            sleeping_monitor: Monitor::new(),
            running: DashMap::new(),
            notifier: Mutex::new(None),
            synchronizer: Synchronizer::new(),
            take_scan_reversed: AtomicBool::new(false),
            add_scan_reversed: AtomicBool::new(false),
            next_index: AtomicUsize::new(0),
        }))
    }

    /// Supplier name; workers derive their indexed names from it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total workers currently accounted for (running or parked).
    pub fn thread_count(&self) -> usize {
        self.threads_count.load(Ordering::SeqCst)
    }

    /// Poolable workers currently accounted for.
    pub fn poolable_thread_count(&self) -> usize {
        self.poolable_count.load(Ordering::SeqCst)
    }

    /// Fixed bound on poolable workers.
    pub fn max_poolable(&self) -> usize {
        self.max_poolable
    }

    /// Current total bound (poolable + detached budget, possibly grown).
    pub fn max_total(&self) -> usize {
        self.max_total.load(Ordering::SeqCst)
    }

    /// Total bound the supplier was created with.
    pub fn initial_max_total(&self) -> usize {
        self.initial_max_total
    }

    /// Workers currently executing a job.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Workers currently parked in sleeping slots.
    pub fn parked_count(&self) -> usize {
        self.sleeping
            .iter()
            .filter(|slot| slot.lock().is_some())
            .count()
    }

    /// Logs a snapshot of the supplier state.
    pub fn log_status(&self) {
        tracing::info!(
            supplier = %self.name,
            running = self.running_count(),
            parked = self.parked_count(),
            total = self.thread_count(),
            max_total = self.max_total(),
            "supplier status"
        );
    }

    /// Obtains a worker, waiting (and possibly growing the detached cap)
    /// when both pools are saturated.
    pub fn get_or_create(self: &Arc<Self>) -> Worker {
        self.acquire(1)
    }

    /// As [`ThreadSupplier::get_or_create`], with a custom request budget:
    /// each saturation timeout both grows the cap and consumes one unit of
    /// budget before the request re-enters the fast path.
    pub fn get_or_create_with_budget(self: &Arc<Self>, request_budget: usize) -> Worker {
        self.acquire(request_budget)
    }

    /// Obtains a worker and names it.
    pub fn get_or_create_named(self: &Arc<Self>, name: impl Into<String>) -> Worker {
        let worker = self.get_or_create();
        worker.set_name(name);
        worker
    }

    fn acquire(self: &Arc<Self>, initial_budget: usize) -> Worker {
        let mut budget = initial_budget;
        loop {
            if let Some(worker) = self.take_parked() {
                return worker;
            }
            let poolable_full = self.poolable_count.load(Ordering::SeqCst) >= self.max_poolable;
            let total_full =
                self.threads_count.load(Ordering::SeqCst) >= self.max_total.load(Ordering::SeqCst);
            if budget > 0 && poolable_full && total_full {
                let mut guard = self.sleeping_monitor.enter();
                if let Some(worker) = self.take_parked() {
                    return worker;
                }
                if self.poolable_count.load(Ordering::SeqCst) >= self.max_poolable
                    && self.threads_count.load(Ordering::SeqCst)
                        >= self.max_total.load(Ordering::SeqCst)
                {
                    // Saturated: bounded wait, then adaptive relief.
                    if self.request_timeout.is_zero() {
                        // Growth disabled: notification-driven retry.
                        self.sleeping_monitor.wait(&mut guard);
                        continue;
                    }
                    let started = Instant::now();
                    let timed_out = self
                        .sleeping_monitor
                        .wait_for(&mut guard, self.request_timeout);
                    if !timed_out && started.elapsed() < self.request_timeout {
                        self.maybe_decay_max_total();
                        continue;
                    }
                    let grown = self.max_total.load(Ordering::SeqCst) + self.increasing_step;
                    self.max_total.store(grown, Ordering::SeqCst);
                    *self.last_growth.lock() = Some(Instant::now());
                    tracing::info!(
                        supplier = %self.name,
                        waited_ms = started.elapsed().as_millis() as u64,
                        max_detached = grown - self.max_poolable,
                        "supplier saturated; detached cap temporarily increased"
                    );
                    budget -= 1;
                    continue;
                }
                // Conditions changed while taking the monitor; retry.
                continue;
            } else if poolable_full {
                if self.threads_count.load(Ordering::SeqCst) < self.max_total.load(Ordering::SeqCst)
                {
                    return self.create_detached();
                }
                budget = initial_budget;
                continue;
            }
            let _guard = self.sleeping_monitor.enter();
            if self.poolable_count.load(Ordering::SeqCst) >= self.max_poolable {
                continue;
            }
            return self.create_poolable();
        }
    }

    /// Decays an inflated cap by ⌊step/2⌋ (clamped at the initial bound)
    /// once quiescence since the last growth exceeds the threshold. Resets
    /// the growth timestamp so each growth decays at most once.
    fn maybe_decay_max_total(&self) {
        let current = self.max_total.load(Ordering::SeqCst);
        if current <= self.initial_max_total {
            return;
        }
        let mut last_growth = self.last_growth.lock();
        let Some(grown_at) = *last_growth else {
            return;
        };
        if grown_at.elapsed() > self.decay_threshold {
            let next = current
                .saturating_sub(self.increasing_step / 2)
                .max(self.initial_max_total);
            self.max_total.store(next, Ordering::SeqCst);
            *last_growth = None;
            tracing::info!(
                supplier = %self.name,
                max_detached = next - self.max_poolable,
                "quiescent supplier; detached cap decreased toward initial value"
            );
        }
    }

    fn create_poolable(self: &Arc<Self>) -> Worker {
        self.poolable_count.fetch_add(1, Ordering::SeqCst);
        self.threads_count.fetch_add(1, Ordering::SeqCst);
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        Worker::new(self, WorkerKind::Poolable, index, self.daemon)
    }

    /// Creates a detached worker outside the cap checks. Counted against the
    /// total, released when the worker exits.
    pub fn create_detached(self: &Arc<Self>) -> Worker {
        self.threads_count.fetch_add(1, Ordering::SeqCst);
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        Worker::new(self, WorkerKind::Detached, index, self.daemon)
    }

    /// Scans the sleeping slots for a parked worker. A slot occupant is
    /// re-verified under its own monitor; one observed in any state other
    /// than parked is interrupted as defective and scanning continues.
    fn take_parked(&self) -> Option<Worker> {
        let reversed = self.take_scan_reversed.fetch_xor(true, Ordering::SeqCst);
        let len = self.sleeping.len();
        for step in 0..len {
            let idx = if reversed { len - 1 - step } else { step };
            let candidate = self.sleeping[idx].lock().clone();
            let Some(worker) = candidate else { continue };
            let mut taken = false;
            let mut defective = false;
            {
                let _control = worker.lock_control();
                let mut slot = self.sleeping[idx].lock();
                if slot.as_ref().is_some_and(|w| w.same_as(&worker)) {
                    if worker.is_parked() {
                        *slot = None;
                        taken = true;
                    } else {
                        defective = true;
                    }
                }
            }
            if taken {
                return Some(worker);
            }
            if defective {
                tracing::error!(
                    supplier = %self.name,
                    worker = %worker.name(),
                    "sleeping worker not in parked state; interrupting"
                );
                worker.interrupt();
            }
        }
        None
    }

    /// Publishes a worker into a free sleeping slot. Per-slot publishes are
    /// guarded by a keyed mutex named with the slot index and re-check
    /// emptiness, so only one producer fills a slot observed empty. Returns
    /// `false` when every slot is taken; the caller must self-shut-down.
    pub(crate) fn add_poolable_sleeping(&self, worker: &Worker) -> bool {
        let reversed = self.add_scan_reversed.fetch_xor(true, Ordering::SeqCst);
        let len = self.sleeping.len();
        for step in 0..len {
            let idx = if reversed { len - 1 - step } else { step };
            if self.sleeping[idx].lock().is_some() {
                continue;
            }
            let id = format!("{}:slot[{}]", self.name, idx);
            let published = self.synchronizer.execute(&id, || {
                let mut slot = self.sleeping[idx].lock();
                if slot.is_none() {
                    *slot = Some(worker.clone());
                    true
                } else {
                    false
                }
            });
            if published {
                return true;
            }
        }
        false
    }

    fn remove_poolable_sleeping(&self, worker: &Worker) -> bool {
        for slot in self.sleeping.iter() {
            let mut slot = slot.lock();
            if slot.as_ref().is_some_and(|w| w.same_as(worker)) {
                *slot = None;
                return true;
            }
        }
        false
    }

    pub(crate) fn running_insert(&self, worker: &Worker) {
        self.running.insert(worker.index(), worker.clone());
    }

    pub(crate) fn running_remove(&self, worker: &Worker) -> bool {
        self.running.remove(&worker.index()).is_some()
    }

    /// Releases every trace of a retiring worker: running-set membership,
    /// sleeping slot, counters. Called exactly once per worker.
    pub(crate) fn forget(&self, worker: &Worker) {
        self.running_remove(worker);
        self.remove_poolable_sleeping(worker);
        self.threads_count.fetch_sub(1, Ordering::SeqCst);
        if worker.kind() == WorkerKind::Poolable {
            self.poolable_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Wakes the notifier worker, creating it on first use. The notifier is
    /// a max-priority detached worker that, each time it is woken, notifies
    /// all waiters on the sleeping-array monitor.
    pub(crate) fn wake_notifier(self: &Arc<Self>) {
        if self.nudge_notifier() {
            return;
        }
        let init_id = format!("{}:notifier-init", self.name);
        self.synchronizer.execute(&init_id, || {
            let mut notifier = self.notifier.lock();
            if notifier.is_none() {
                let worker = self.create_detached();
                worker.set_name(format!("{} - notifier", self.name));
                worker.set_priority(Priority::High);
                let looper = worker.clone();
                let supplier = Arc::downgrade(self);
                let job: Job = Box::new(move || loop {
                    looper.wait_on_monitor();
                    if !looper.is_alive() {
                        break;
                    }
                    let Some(supplier) = supplier.upgrade() else {
                        break;
                    };
                    let _guard = supplier.sleeping_monitor.enter();
                    supplier.sleeping_monitor.notify_all();
                });
                worker.assign(job);
                match worker.start() {
                    Ok(()) => *notifier = Some(worker),
                    Err(e) => tracing::error!(
                        supplier = %self.name,
                        error = %e,
                        "failed to start notifier worker"
                    ),
                }
            }
        });
        self.nudge_notifier();
    }

    fn nudge_notifier(&self) -> bool {
        let notifier = self.notifier.lock();
        match notifier.as_ref() {
            Some(worker) => {
                worker.notify();
                true
            }
            None => false,
        }
    }

    /// Shuts down every parked worker (they exit on wake), tells running
    /// workers to exit after their current call, and finally signals and
    /// retires the notifier.
    pub fn shut_down_all(&self) {
        for slot in self.sleeping.iter() {
            let worker = slot.lock().clone();
            if let Some(worker) = worker {
                worker.shut_down();
            }
        }
        for entry in self.running.iter() {
            entry.value().shut_down();
        }
        let init_id = format!("{}:notifier-init", self.name);
        self.synchronizer.execute(&init_id, || {
            if let Some(notifier) = self.notifier.lock().take() {
                notifier.shut_down();
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn force_last_growth(&self, instant: Instant) {
        *self.last_growth.lock() = Some(instant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetachedCount, ThreadCount};
    use std::time::Duration;

    fn settings(poolable: usize, detached: usize) -> SupplierSettings {
        SupplierSettings {
            max_poolable: ThreadCount::Fixed(poolable),
            max_detached: DetachedCount::Fixed(detached),
            request_timeout: Duration::from_millis(100),
            daemon: true,
            increasing_step: 2,
            decay_threshold: Duration::from_millis(50),
        }
    }

    #[test]
    fn counters_track_created_workers() {
        let supplier = ThreadSupplier::from_settings("counters", settings(2, 3)).unwrap();
        let a = supplier.get_or_create();
        let b = supplier.get_or_create();
        assert_eq!(supplier.poolable_thread_count(), 2);
        assert_eq!(supplier.thread_count(), 2);
        let c = supplier.get_or_create();
        assert_eq!(supplier.poolable_thread_count(), 2);
        assert_eq!(supplier.thread_count(), 3);
        assert_eq!(a.kind(), WorkerKind::Poolable);
        assert_eq!(b.kind(), WorkerKind::Poolable);
        assert_eq!(c.kind(), WorkerKind::Detached);
        a.retire();
        b.retire();
        c.retire();
        assert_eq!(supplier.thread_count(), 0);
        assert_eq!(supplier.poolable_thread_count(), 0);
    }

    #[test]
    fn decay_requires_quiescence_and_clamps_at_initial() {
        let supplier = ThreadSupplier::from_settings("decay", settings(1, 1)).unwrap();
        let initial = supplier.initial_max_total();
        supplier.max_total.store(initial + 2, Ordering::SeqCst);
        // Recent growth: no decay yet.
        supplier.force_last_growth(Instant::now());
        supplier.maybe_decay_max_total();
        assert_eq!(supplier.max_total(), initial + 2);
        // Quiescent growth: decays by step/2 = 1, once.
        supplier.force_last_growth(Instant::now() - Duration::from_millis(200));
        supplier.maybe_decay_max_total();
        assert_eq!(supplier.max_total(), initial + 1);
        // Sentinel reset: a second call without new growth is a no-op.
        supplier.maybe_decay_max_total();
        assert_eq!(supplier.max_total(), initial + 1);
        // Decay never undershoots the initial bound.
        supplier.force_last_growth(Instant::now() - Duration::from_millis(200));
        supplier.maybe_decay_max_total();
        assert_eq!(supplier.max_total(), initial);
    }

    #[test]
    fn sleeping_slot_publish_is_single_producer() {
        let supplier = ThreadSupplier::from_settings("slots", settings(1, 0)).unwrap();
        let worker = supplier.get_or_create();
        assert!(supplier.add_poolable_sleeping(&worker));
        // The only slot is taken now; a second publish must fail.
        let other = Worker::new(&supplier, WorkerKind::Poolable, 99, true);
        assert!(!supplier.add_poolable_sleeping(&other));
        assert_eq!(supplier.parked_count(), 1);
        assert!(supplier.remove_poolable_sleeping(&worker));
        assert_eq!(supplier.parked_count(), 0);
    }
}

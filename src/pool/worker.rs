//! # Workers: the execution contexts handed out by the supplier.
//!
//! A [`Worker`] owns (lazily) an OS thread and an executable slot. The two
//! variants differ only in their main loop:
//!
//! - **Poolable**: runs the slotted job, clears the slot, republishes itself
//!   into a free sleeping slot of its supplier and parks on its own monitor
//!   awaiting reassignment. Lives until told otherwise.
//! - **Detached**: runs the slotted job once and exits.
//!
//! ## Rules
//! - Assignment happens while holding the worker's monitor: the supplier (or
//!   executor) places the job and name, then notifies. The worker resumes
//!   from its park, observes the slot and begins a new iteration.
//! - "Interrupting" a worker marks it not-alive and notifies its monitor;
//!   every wait re-checks its condition, so the worker unwinds its loop
//!   cleanly at the next wake.
//! - A worker that cannot republish itself (no free sleeping slot) retires
//!   instead of lingering unpublished.
//! - Job panics are caught and logged with the worker identity; they never
//!   tear down the worker loop.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::RuntimeError;
use crate::pool::supplier::ThreadSupplier;
use crate::priority::Priority;

/// An executable assigned to a worker.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker variant: reusable or single-use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerKind {
    /// Parks when idle and can be reassigned a new executable.
    Poolable,
    /// Exits after its executable returns.
    Detached,
}

/// State guarded by the worker's monitor mutex.
pub(crate) struct Control {
    pub(crate) job: Option<Job>,
    spawned: bool,
}

struct WorkerInner {
    index: usize,
    kind: WorkerKind,
    daemon: bool,
    supplier: Weak<ThreadSupplier>,
    alive: AtomicBool,
    /// True while the worker sits in its own-monitor wait between
    /// assignments. Plays the role of an observed "waiting" thread state.
    parked: AtomicBool,
    retired: AtomicBool,
    priority: AtomicU8,
    name: Mutex<String>,
    thread_id: Mutex<Option<ThreadId>>,
    control: Mutex<Control>,
    cond: Condvar,
}

/// Shared handle to a worker. Cloning shares the same underlying context.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl Worker {
    pub(crate) fn new(
        supplier: &Arc<ThreadSupplier>,
        kind: WorkerKind,
        index: usize,
        daemon: bool,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                index,
                kind,
                daemon,
                supplier: Arc::downgrade(supplier),
                alive: AtomicBool::new(true),
                parked: AtomicBool::new(false),
                retired: AtomicBool::new(false),
                priority: AtomicU8::new(Priority::Normal.value()),
                name: Mutex::new(format!("{} - executor {}", supplier.name(), index)),
                thread_id: Mutex::new(None),
                control: Mutex::new(Control {
                    job: None,
                    spawned: false,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Numeric identity within the supplier.
    pub fn index(&self) -> usize {
        self.inner.index
    }

    /// Worker variant.
    pub fn kind(&self) -> WorkerKind {
        self.inner.kind
    }

    /// Daemon attribute recorded at creation.
    pub fn is_daemon(&self) -> bool {
        self.inner.daemon
    }

    /// Current (possibly reassigned) display name.
    pub fn name(&self) -> String {
        self.inner.name.lock().clone()
    }

    /// Replaces the display name.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.inner.name.lock() = name.into();
    }

    /// Resets the name to `"{prefix} {index}"`, with the supplier default
    /// prefix when `prefix` is `None`.
    pub fn set_indexed_name(&self, prefix: Option<&str>) {
        let base = match (prefix, self.inner.supplier.upgrade()) {
            (Some(p), _) => p.to_owned(),
            (None, Some(s)) => format!("{} - executor", s.name()),
            (None, None) => "executor".to_owned(),
        };
        self.set_name(format!("{} {}", base, self.inner.index));
    }

    /// Logical scheduling priority currently carried by the worker.
    pub fn priority(&self) -> Priority {
        Priority::clamp_from(self.inner.priority.load(Ordering::SeqCst))
    }

    /// Updates the logical scheduling priority (best-effort hint).
    pub fn set_priority(&self, priority: Priority) {
        self.inner.priority.store(priority.value(), Ordering::SeqCst);
    }

    /// False once the worker has been told to exit.
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// True while the worker waits on its own monitor for reassignment.
    pub(crate) fn is_parked(&self) -> bool {
        self.inner.parked.load(Ordering::SeqCst)
    }

    /// Id of the OS thread backing this worker, once spawned.
    pub(crate) fn thread_id(&self) -> Option<ThreadId> {
        *self.inner.thread_id.lock()
    }

    /// Identity comparison: same underlying context.
    pub(crate) fn same_as(&self, other: &Worker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.inner.control.lock()
    }

    /// Places an executable in the worker's slot. Call before
    /// [`Worker::start`].
    pub fn set_executable(&self, executable: impl FnOnce() + Send + 'static) {
        self.assign(Box::new(executable));
    }

    pub(crate) fn assign(&self, job: Job) {
        self.inner.control.lock().job = Some(job);
    }

    /// Starts the worker: spawns the OS thread on first use, or wakes a
    /// parked poolable worker that has just been reassigned.
    pub fn start(&self) -> Result<(), RuntimeError> {
        {
            let mut control = self.inner.control.lock();
            if control.spawned {
                self.inner.cond.notify_all();
                return Ok(());
            }
            control.spawned = true;
        }
        let name = self.name();
        let worker = self.clone();
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            *worker.inner.thread_id.lock() = Some(thread::current().id());
            match worker.inner.kind {
                WorkerKind::Poolable => poolable_main(&worker),
                WorkerKind::Detached => detached_main(&worker),
            }
        });
        match spawned {
            Ok(_) => Ok(()),
            Err(source) => {
                self.retire();
                Err(RuntimeError::Spawn { name, source })
            }
        }
    }

    /// Wakes the worker's monitor without assigning anything (used to nudge
    /// the notifier and to deliver shutdown).
    pub(crate) fn notify(&self) {
        let _control = self.inner.control.lock();
        self.inner.cond.notify_all();
    }

    /// Blocks on the worker's own monitor until a job is assigned or the
    /// worker is told to exit.
    pub(crate) fn park(&self, control: &mut MutexGuard<'_, Control>) {
        self.inner.parked.store(true, Ordering::SeqCst);
        while control.job.is_none() && self.is_alive() {
            self.inner.cond.wait(control);
        }
        self.inner.parked.store(false, Ordering::SeqCst);
    }

    /// Waits on the worker's monitor; wakes on any notification. Used by the
    /// notifier loop, which re-checks liveness itself.
    pub(crate) fn wait_on_monitor(&self) {
        let mut control = self.inner.control.lock();
        if self.is_alive() {
            self.inner.parked.store(true, Ordering::SeqCst);
            self.inner.cond.wait(&mut control);
            self.inner.parked.store(false, Ordering::SeqCst);
        }
    }

    /// Tells the worker to exit at its next wake (parked workers) or after
    /// its current executable returns (running workers).
    pub(crate) fn shut_down(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.notify();
    }

    /// Marks a defective worker dead and releases every resource it held.
    /// Invoked by the supplier when a slot occupant is observed in an
    /// unexpected state.
    pub(crate) fn interrupt(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.retire();
        self.notify();
        if let Some(supplier) = self.inner.supplier.upgrade() {
            supplier.wake_notifier();
        }
    }

    /// Removes the worker from the supplier's bookkeeping and releases its
    /// counters, exactly once.
    pub(crate) fn retire(&self) {
        if self.inner.retired.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.alive.store(false, Ordering::SeqCst);
        if let Some(supplier) = self.inner.supplier.upgrade() {
            supplier.forget(self);
        }
    }

    fn take_job(&self) -> Option<Job> {
        self.inner.control.lock().job.take()
    }

    fn supplier(&self) -> Option<Arc<ThreadSupplier>> {
        self.inner.supplier.upgrade()
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.inner.index)
            .field("kind", &self.inner.kind)
            .field("name", &self.name())
            .field("alive", &self.is_alive())
            .field("parked", &self.is_parked())
            .finish()
    }
}

/// Stringifies a caught panic payload for logging and task errors.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

fn run_job(worker: &Worker, job: Job) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
        tracing::error!(
            worker = %worker.name(),
            "executable panicked on worker: {}",
            panic_reason(payload.as_ref())
        );
    }
}

/// Main loop of a poolable worker. Runs the assigned job, republishes the
/// worker into a sleeping slot and parks for reassignment, until the worker
/// is told to exit or no slot is free.
fn poolable_main(worker: &Worker) {
    loop {
        let Some(job) = worker.take_job() else { break };
        let Some(supplier) = worker.supplier() else { break };
        supplier.running_insert(worker);
        run_job(worker, job);
        supplier.running_remove(worker);
        worker.set_indexed_name(None);
        if !worker.is_alive() {
            break;
        }
        let mut control = worker.lock_control();
        if !supplier.add_poolable_sleeping(worker) {
            drop(control);
            tracing::warn!(
                worker = %worker.name(),
                "no free sleeping slot; worker retiring"
            );
            break;
        }
        supplier.wake_notifier();
        drop(supplier);
        worker.park(&mut control);
        let reassigned = control.job.is_some();
        drop(control);
        if !reassigned {
            break;
        }
    }
    worker.retire();
    if let Some(supplier) = worker.supplier() {
        supplier.wake_notifier();
    }
    worker.notify();
}

/// Main loop of a detached worker: one job, then exit.
fn detached_main(worker: &Worker) {
    let job = worker.take_job();
    if let Some(supplier) = worker.supplier() {
        supplier.running_insert(worker);
    }
    if let Some(job) = job {
        run_job(worker, job);
    }
    worker.retire();
    if let Some(supplier) = worker.supplier() {
        supplier.wake_notifier();
    }
    worker.notify();
}

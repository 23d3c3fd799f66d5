//! # Queued task executor.
//!
//! One FIFO queue, one drain worker. The drain dequeues tasks in enqueue
//! order; `Sync` tasks run inline on the drain worker, `Async` tasks get a
//! dedicated supplier worker when drained, `PureAsync` tasks get one at
//! admission and never touch the queue.
//!
//! ```text
//! submit ──► queue ──► drain ──► Sync: run inline
//!    │                   └─────► Async: worker ──► in-flight set
//!    └──► PureAsync ───────────► worker ──► in-flight set
//! ```
//!
//! ## Rules
//! - Within one executor, non-`PureAsync` tasks start strictly in enqueue
//!   order.
//! - The drain parks on the queue-fill monitor when the queue empties and on
//!   the resume monitor while suspended; both monitors are instance-keyed
//!   strings in the keyed-mutex registry.
//! - Suspension is cooperative: *immediate* waits for in-flight tasks and
//!   for the drain to observe the flag; *graceful* enqueues a sentinel task
//!   that flips the flag when drained, escalating everything queued before
//!   it.
//! - Shutdown drains (graceful) or halts (immediate), clears and aborts
//!   whatever is still queued, then waits for the drain worker to exit.
//!   Running tasks are never preempted.
//! - The in-flight set, not the queue, is authoritative for async
//!   accounting.

use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RuntimeError, TaskError};
use crate::pool::{ThreadSupplier, Worker};
use crate::priority::Priority;
use crate::synchronizer::{Monitor, Synchronizer};
use crate::tasks::{
    can_be_executed, route_change_priority, AbstractTask, ExecutionMode, Owner, ProducerTask, Task,
    TaskRef,
};

/// Monitor concerns, combined with the executor instance id into keyed-mutex
/// ids.
const M_RESUME: &str = "resume";
const M_SUSPENSION: &str = "suspension";
const M_QUEUE_FILL: &str = "queue-fill";
const M_DRAINED: &str = "drained";
const M_TERMINATION: &str = "termination";

static NEXT_INSTANCE: AtomicUsize = AtomicUsize::new(1);

pub(crate) struct ExecutorInner {
    instance_id: String,
    name: String,
    async_name: String,
    daemon: bool,
    default_priority: AtomicU8,
    logging_threshold: u64,
    group_member: bool,
    supplier: Arc<ThreadSupplier>,
    synchronizer: Arc<Synchronizer>,
    queue: Mutex<Vec<Arc<dyn AbstractTask>>>,
    in_flight: Mutex<Vec<Arc<dyn AbstractTask>>>,
    current: Mutex<Option<Arc<dyn AbstractTask>>>,
    suspended: AtomicBool,
    terminated: AtomicBool,
    drain_exited: AtomicBool,
    executed_count: AtomicU64,
    tracking: AtomicBool,
    drain_worker: Mutex<Option<Worker>>,
    creation_site: Option<&'static Location<'static>>,
}

impl ExecutorInner {
    fn monitor(&self, concern: &str) -> Arc<Monitor> {
        self.synchronizer
            .mutex(&format!("{}:{}", self.instance_id, concern))
    }

    pub(crate) fn default_priority(&self) -> Priority {
        Priority::clamp_from(self.default_priority.load(Ordering::SeqCst))
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub(crate) fn tracking_enabled(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn queue_snapshot(&self) -> Vec<Arc<dyn AbstractTask>> {
        self.queue.lock().clone()
    }

    fn in_flight_snapshot(&self) -> Vec<Arc<dyn AbstractTask>> {
        self.in_flight.lock().clone()
    }

    /// Removes `task` from the queue by identity; `false` when it was not
    /// queued (someone else dispatched or moved it).
    pub(crate) fn queue_remove(&self, task: &Arc<dyn AbstractTask>) -> bool {
        let mut queue = self.queue.lock();
        let id = task.state().id();
        match queue.iter().position(|t| t.state().id() == id) {
            Some(pos) => {
                queue.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn queue_contains(&self, task: &Arc<dyn AbstractTask>) -> bool {
        let id = task.state().id();
        self.queue.lock().iter().any(|t| t.state().id() == id)
    }

    fn in_flight_remove(&self, task: &Arc<dyn AbstractTask>) {
        let mut in_flight = self.in_flight.lock();
        let id = task.state().id();
        if let Some(pos) = in_flight.iter().position(|t| t.state().id() == id) {
            in_flight.remove(pos);
        }
    }

    /// Admission: refuses after shutdown, enforces submit-once, collapses
    /// duplicate once-only admissions to a no-op.
    pub(crate) fn submit_task(
        self: &Arc<Self>,
        task: Arc<dyn AbstractTask>,
    ) -> Result<(), RuntimeError> {
        if self.is_terminated() {
            return Err(RuntimeError::ExecutorShutDown {
                name: self.name.clone(),
            });
        }
        task.state().mark_submitted()?;
        if !can_be_executed(&task) {
            return Ok(());
        }
        self.enqueue(task)
    }

    /// Places a task into this executor: `PureAsync` dispatches immediately,
    /// everything else is queued and the drain is woken. Also used for
    /// cross-queue moves of already-submitted tasks.
    pub(crate) fn enqueue(self: &Arc<Self>, task: Arc<dyn AbstractTask>) -> Result<(), RuntimeError> {
        self.bind_for_mode(&task);
        if task.state().mode() == ExecutionMode::PureAsync {
            self.in_flight.lock().push(Arc::clone(&task));
            if let Err(e) = self.spawn_async(&task) {
                self.in_flight_remove(&task);
                task.abort();
                return Err(e);
            }
        } else {
            self.queue.lock().push(task);
            let monitor = self.monitor(M_QUEUE_FILL);
            let _guard = monitor.enter();
            monitor.notify_all();
        }
        Ok(())
    }

    /// Rebinds the worker binding to the task's mode: `Sync` tasks run on
    /// the drain worker, async modes get their dedicated worker at dispatch.
    pub(crate) fn bind_for_mode(&self, task: &Arc<dyn AbstractTask>) {
        match task.state().mode() {
            ExecutionMode::Sync => {
                if let Some(worker) = self.drain_worker.lock().clone() {
                    task.state().bind_worker(worker);
                }
            }
            ExecutionMode::Async | ExecutionMode::PureAsync => task.state().clear_worker(),
        }
    }

    /// Obtains a supplier worker for an async task and starts it. The worker
    /// carries the async executor name and the task's priority; on
    /// completion it removes the task from the in-flight set.
    fn spawn_async(self: &Arc<Self>, task: &Arc<dyn AbstractTask>) -> Result<(), RuntimeError> {
        let worker = self.supplier.get_or_create();
        worker.set_indexed_name(Some(&self.async_name));
        worker.set_priority(task.state().priority());
        task.state().bind_worker(worker.clone());
        let weak = Arc::downgrade(self);
        let job_task = Arc::clone(task);
        worker.assign(Box::new(move || {
            job_task.execute();
            if let Some(inner) = weak.upgrade() {
                inner.in_flight_remove(&job_task);
                inner.increment_and_log_executed_count();
            }
        }));
        worker.start()
    }

    fn increment_and_log_executed_count(&self) {
        let count = self.executed_count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.logging_threshold > 0 && count % self.logging_threshold == 0 {
            tracing::info!(executor = %self.name, executed = count, "executed tasks");
        }
    }

    /// The drain loop. Runs on a dedicated detached worker until terminated.
    fn run_drain(self: &Arc<Self>) {
        while !self.is_terminated() {
            let snapshot = self.queue_snapshot();
            if snapshot.is_empty() {
                {
                    let drained = self.monitor(M_DRAINED);
                    let _guard = drained.enter();
                    drained.notify_all();
                }
                let fill = self.monitor(M_QUEUE_FILL);
                let mut guard = fill.enter();
                if self.queue.lock().is_empty() && !self.is_terminated() {
                    fill.wait(&mut guard);
                }
                continue;
            }
            for task in snapshot {
                {
                    let resume = self.monitor(M_RESUME);
                    let mut guard = resume.enter();
                    if self.suspended.load(Ordering::SeqCst) {
                        tracing::info!(executor = %self.name, "drain suspended");
                        resume.wait(&mut guard);
                        tracing::info!(executor = %self.name, "drain resumed");
                        break;
                    }
                }
                *self.current.lock() = Some(Arc::clone(&task));
                let dispatched = {
                    let _monitor = task.state().lock();
                    if self.queue_remove(&task) {
                        if task.state().mode() != ExecutionMode::Sync {
                            self.in_flight.lock().push(Arc::clone(&task));
                        }
                        true
                    } else {
                        *self.current.lock() = None;
                        false
                    }
                };
                if dispatched {
                    match task.state().mode() {
                        ExecutionMode::Sync => self.run_inline(&task),
                        ExecutionMode::Async | ExecutionMode::PureAsync => {
                            if let Err(e) = self.spawn_async(&task) {
                                tracing::error!(
                                    executor = %self.name,
                                    task = task.state().id(),
                                    error = %e,
                                    "failed to start worker for async task; aborting it"
                                );
                                self.in_flight_remove(&task);
                                task.abort();
                            }
                        }
                    }
                }
                {
                    let suspension = self.monitor(M_SUSPENSION);
                    let _guard = suspension.enter();
                    suspension.notify_all();
                }
                if self.is_terminated() {
                    break;
                }
            }
        }
        let termination = self.monitor(M_TERMINATION);
        let _guard = termination.enter();
        self.drain_exited.store(true, Ordering::SeqCst);
        termination.notify_all();
    }

    /// Runs a `Sync` task inline, raising the drain worker to the task's
    /// priority for the duration.
    fn run_inline(&self, task: &Arc<dyn AbstractTask>) {
        let drain_worker = self.drain_worker.lock().clone();
        let task_priority = task.state().priority();
        if let Some(worker) = &drain_worker {
            if worker.priority() != task_priority {
                worker.set_priority(task_priority);
            }
        }
        task.execute();
        if let Some(worker) = &drain_worker {
            let default = self.default_priority();
            if worker.priority() != default {
                worker.set_priority(default);
            }
        }
        self.increment_and_log_executed_count();
    }

    /// Raises the priority of every task queued strictly before `target`
    /// (routed through the owning surface, so group tasks migrate queues)
    /// and of the workers running in-flight tasks.
    pub(crate) fn escalate_before(&self, target: &Arc<dyn AbstractTask>, priority: Priority) {
        let snapshot = self.queue_snapshot();
        let target_id = target.state().id();
        if let Some(pos) = snapshot
            .iter()
            .position(|t| t.state().id() == target_id)
        {
            for predecessor in &snapshot[..pos] {
                route_change_priority(predecessor, priority);
            }
        }
        self.raise_in_flight(priority);
    }

    fn raise_in_flight(&self, priority: Priority) {
        for task in self.in_flight_snapshot() {
            if let Some(worker) = task.state().worker() {
                worker.set_priority(priority);
            }
        }
    }

    /// Raises in-flight workers to `priority` and joins each in-flight task.
    fn join_in_flight(&self, priority: Priority) {
        for task in self.in_flight_snapshot() {
            if let Some(worker) = task.state().worker() {
                worker.set_priority(priority);
            }
            task.wait_for_finish(false);
        }
    }

    fn join_in_flight_untouched(&self) {
        for task in self.in_flight_snapshot() {
            task.wait_for_finish(false);
        }
    }

    /// True once nothing remains for the drain itself: the queue is empty
    /// and no inline task is mid-execution. A task leaves the queue before
    /// it runs, so emptiness alone would release waiters one task early.
    /// In-flight async work is accounted separately.
    fn drained(&self) -> bool {
        if !self.queue.lock().is_empty() {
            return false;
        }
        match self.current.lock().clone() {
            Some(task) => task.state().mode() != ExecutionMode::Sync || task.has_finished(),
            None => true,
        }
    }

    fn await_queue_drained(&self) {
        while !self.drained() && !self.is_terminated() {
            let drained = self.monitor(M_DRAINED);
            let mut guard = drained.enter();
            if !self.drained() && !self.is_terminated() {
                drained.wait(&mut guard);
            }
        }
    }

    pub(crate) fn wait_for_tasks_ending(
        self: &Arc<Self>,
        priority: Priority,
        wait_for_new_added: bool,
    ) {
        loop {
            if self.group_member {
                if priority == self.default_priority() {
                    self.await_queue_drained();
                    self.join_in_flight_untouched();
                } else {
                    // Escalated wait: queued tasks migrate to the executor
                    // of the requested tier; only in-flight work is joined
                    // here.
                    for task in self.queue_snapshot() {
                        route_change_priority(&task, priority);
                    }
                    self.join_in_flight(priority);
                }
            } else {
                let drain_worker = self.drain_worker.lock().clone();
                if let Some(worker) = &drain_worker {
                    worker.set_priority(priority);
                }
                for task in self.queue_snapshot() {
                    route_change_priority(&task, priority);
                }
                self.await_queue_drained();
                self.join_in_flight(priority);
                if let Some(worker) = &drain_worker {
                    worker.set_priority(self.default_priority());
                }
            }
            if !wait_for_new_added || (self.queue_len() == 0 && self.in_flight_len() == 0) {
                return;
            }
        }
    }

    pub(crate) fn wait_for(self: &Arc<Self>, task: &Arc<dyn AbstractTask>, priority: Priority) {
        if !self.group_member {
            self.escalate_before(task, priority);
        }
        task.wait_for_finish(false);
    }

    /// The zero-body task whose execution flips the suspended flag. A
    /// standalone executor keys it once-only so concurrent graceful suspends
    /// collapse; a group-member executor keeps it plain (its queue slot must
    /// stay in this executor regardless of the caller's priority).
    fn create_suspending_task(self: &Arc<Self>, priority: Priority) -> Task {
        let weak = Arc::downgrade(self);
        let task = Task::new(
            Owner::Executor(Arc::downgrade(self)),
            self.name.clone(),
            self.default_priority(),
            false,
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.suspended.store(true, Ordering::SeqCst);
                }
                Ok(())
            },
        );
        if !self.group_member {
            let weak = Arc::downgrade(self);
            task.run_only_once(format!("{}:suspend", self.instance_id), move || {
                weak.upgrade()
                    .map(|inner| inner.suspended.load(Ordering::SeqCst))
                    .unwrap_or(true)
            });
            task.change_priority(priority);
        }
        task
    }

    pub(crate) fn suspend(self: &Arc<Self>, immediately: bool, priority: Priority) {
        let drain_worker = self.drain_worker.lock().clone();
        if let Some(worker) = &drain_worker {
            worker.set_priority(priority);
        }
        if immediately {
            self.suspended.store(true, Ordering::SeqCst);
            self.join_in_flight(priority);
            loop {
                let Some(task) = self.current.lock().clone() else {
                    break;
                };
                if task.has_finished() {
                    break;
                }
                let suspension = self.monitor(M_SUSPENSION);
                let mut guard = suspension.enter();
                let Some(task) = self.current.lock().clone() else {
                    break;
                };
                if task.has_finished() {
                    break;
                }
                suspension.wait(&mut guard);
            }
        } else {
            self.join_in_flight(priority);
            let sentinel = self.create_suspending_task(priority);
            match sentinel.submit() {
                Ok(_) => {
                    self.escalate_before(&sentinel.abstract_task(), priority);
                    sentinel.wait_for_finish(false);
                }
                Err(e) => tracing::warn!(
                    executor = %self.name,
                    error = %e,
                    "could not submit suspension sentinel"
                ),
            }
        }
        if let Some(worker) = &drain_worker {
            worker.set_priority(self.default_priority());
        }
    }

    pub(crate) fn resume(&self) {
        let resume = self.monitor(M_RESUME);
        let _guard = resume.enter();
        self.suspended.store(false, Ordering::SeqCst);
        resume.notify_all();
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    pub(crate) fn shut_down(self: &Arc<Self>, wait_for_tasks_termination: bool, caller: &'static Location<'static>) -> bool {
        if let Some(site) = self.creation_site {
            if site.file() != caller.file() {
                tracing::warn!(
                    executor = %self.name,
                    caller = %caller.file(),
                    "shutdown refused: executor is undestroyable outside its creation site"
                );
                return false;
            }
        }
        if self.is_terminated() {
            return true;
        }
        self.suspend(!wait_for_tasks_termination, self.default_priority());
        self.terminated.store(true, Ordering::SeqCst);
        self.log_queue_info();
        let cleared = std::mem::take(&mut *self.queue.lock());
        for task in &cleared {
            task.abort();
        }
        self.in_flight.lock().clear();
        {
            let drained = self.monitor(M_DRAINED);
            let _guard = drained.enter();
            drained.notify_all();
        }
        self.resume();
        {
            let fill = self.monitor(M_QUEUE_FILL);
            let _guard = fill.enter();
            fill.notify_all();
        }
        {
            let termination = self.monitor(M_TERMINATION);
            let mut guard = termination.enter();
            while !self.drain_exited.load(Ordering::SeqCst) {
                termination.wait(&mut guard);
            }
        }
        self.close_resources();
        true
    }

    fn close_resources(&self) {
        self.drain_worker.lock().take();
        self.current.lock().take();
        for concern in [M_RESUME, M_SUSPENSION, M_QUEUE_FILL, M_DRAINED, M_TERMINATION] {
            self.synchronizer
                .remove(&format!("{}:{}", self.instance_id, concern));
        }
        tracing::info!(executor = %self.name, "resources released");
    }

    pub(crate) fn log_queue_info(&self) {
        tracing::info!(
            executor = %self.name,
            executed = self.executed_count.load(Ordering::SeqCst),
            unexecuted = self.queue_len() + self.in_flight_len(),
            "queue status"
        );
    }
}

/// A single-queue, single-drain task executor. Clones share the executor.
#[derive(Clone)]
pub struct QueuedExecutor {
    inner: Arc<ExecutorInner>,
}

impl QueuedExecutor {
    /// Creates an executor with its own keyed-mutex registry.
    ///
    /// With `undestroyable == true` the creation site is recorded and
    /// [`QueuedExecutor::shut_down`] becomes a no-op for every other caller
    /// file.
    #[track_caller]
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        name: impl Into<String>,
        async_name: impl Into<String>,
        supplier: Arc<ThreadSupplier>,
        default_priority: Priority,
        daemon: bool,
        logging_threshold: u64,
        undestroyable: bool,
    ) -> Result<Self, RuntimeError> {
        let site = if undestroyable {
            Some(Location::caller())
        } else {
            None
        };
        Self::build(
            name,
            async_name,
            supplier,
            Synchronizer::new(),
            default_priority,
            daemon,
            logging_threshold,
            false,
            site,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        name: impl Into<String>,
        async_name: impl Into<String>,
        supplier: Arc<ThreadSupplier>,
        synchronizer: Arc<Synchronizer>,
        default_priority: Priority,
        daemon: bool,
        logging_threshold: u64,
        group_member: bool,
        creation_site: Option<&'static Location<'static>>,
    ) -> Result<Self, RuntimeError> {
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(ExecutorInner {
            instance_id: format!("queued-executor-{instance}"),
            name: name.into(),
            async_name: async_name.into(),
            daemon,
            default_priority: AtomicU8::new(default_priority.value()),
            logging_threshold,
            group_member,
            supplier,
            synchronizer,
            queue: Mutex::new(Vec::new()),
            in_flight: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            suspended: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            drain_exited: AtomicBool::new(false),
            executed_count: AtomicU64::new(0),
            tracking: AtomicBool::new(false),
            drain_worker: Mutex::new(None),
            creation_site,
        });
        Self::start_drain(&inner)?;
        Ok(Self { inner })
    }

    /// Spawns the drain on a dedicated detached worker.
    fn start_drain(inner: &Arc<ExecutorInner>) -> Result<(), RuntimeError> {
        let worker = inner.supplier.create_detached();
        worker.set_name(inner.name.clone());
        worker.set_priority(inner.default_priority());
        let weak = Arc::downgrade(inner);
        worker.assign(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.run_drain();
            }
        }));
        worker.start()?;
        *inner.drain_worker.lock() = Some(worker);
        Ok(())
    }

    pub(crate) fn inner(&self) -> &Arc<ExecutorInner> {
        &self.inner
    }

    /// Executor name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Daemon attribute recorded at creation.
    pub fn is_daemon(&self) -> bool {
        self.inner.daemon
    }

    /// Creates a runnable task owned by this executor, at its default
    /// priority.
    pub fn create_task<F>(&self, executable: F) -> Task
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        Task::new(
            Owner::Executor(Arc::downgrade(&self.inner)),
            self.inner.name.clone(),
            self.inner.default_priority(),
            self.inner.tracking_enabled(),
            executable,
        )
    }

    /// Creates a producer task owned by this executor, at its default
    /// priority.
    pub fn create_producer_task<T, F>(&self, executable: F) -> ProducerTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        ProducerTask::new(
            Owner::Executor(Arc::downgrade(&self.inner)),
            self.inner.name.clone(),
            self.inner.default_priority(),
            self.inner.tracking_enabled(),
            executable,
        )
    }

    /// Raises everything queued before `task` (and the in-flight workers) to
    /// `priority`, then waits for `task` to finish.
    pub fn wait_for(&self, task: impl Into<TaskRef>, priority: Priority) {
        let task = task.into();
        self.inner.wait_for(&task.inner, priority);
    }

    /// Waits until the queue drains and in-flight tasks complete, escalating
    /// pending work to `priority`. With `wait_for_new_added` the wait
    /// repeats until a pass observes nothing pending.
    pub fn wait_for_tasks_ending(&self, priority: Priority, wait_for_new_added: bool) {
        self.inner.wait_for_tasks_ending(priority, wait_for_new_added);
    }

    /// Rewrites the executor default priority and escalates queued tasks.
    pub fn change_priority(&self, priority: Priority) {
        self.inner
            .default_priority
            .store(priority.value(), Ordering::SeqCst);
        if let Some(worker) = self.inner.drain_worker.lock().clone() {
            worker.set_priority(priority);
        }
        for task in self.inner.queue_snapshot() {
            route_change_priority(&task, priority);
        }
    }

    /// Suspends the drain: immediately (wait for the flag to be observed) or
    /// gracefully (drain everything queued first). `priority` escalates the
    /// work that must complete before suspension holds.
    pub fn suspend(&self, immediately: bool, priority: Priority) {
        self.inner.suspend(immediately, priority);
    }

    /// Resumes a suspended drain.
    pub fn resume(&self) {
        self.inner.resume();
    }

    /// True while the drain holds (or is about to hold) on the resume
    /// monitor.
    pub fn is_suspended(&self) -> bool {
        self.inner.is_suspended()
    }

    /// Tasks currently queued (excludes in-flight).
    pub fn queued_count(&self) -> usize {
        self.inner.queue_len()
    }

    /// Async tasks currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight_len()
    }

    /// Tasks executed so far.
    pub fn executed_count(&self) -> u64 {
        self.inner.executed_count.load(Ordering::SeqCst)
    }

    /// Enables or disables creation-site capture on tasks created from now
    /// on.
    pub fn set_task_creation_tracking(&self, enabled: bool) {
        self.inner.tracking.store(enabled, Ordering::SeqCst);
    }

    /// Logs executed/unexecuted counts.
    pub fn log_queue_info(&self) {
        self.inner.log_queue_info();
    }

    /// Shuts the executor down: drains first when
    /// `wait_for_tasks_termination`, otherwise clears and aborts pending
    /// tasks. Running tasks are never preempted. Returns `false` when an
    /// undestroyable executor refuses the caller.
    #[track_caller]
    pub fn shut_down(&self, wait_for_tasks_termination: bool) -> bool {
        self.inner
            .shut_down(wait_for_tasks_termination, Location::caller())
    }
}

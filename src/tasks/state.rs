//! # Shared task state machine.
//!
//! [`TaskState`] holds everything common to runnable and producer tasks:
//! submission/start/finish flags behind the task monitor, execution mode,
//! priority, the captured error, the worker binding and the owning surface.
//! The concrete payload (runnable closure, producer closure + result) lives
//! in the handle cores; queues and drains see tasks only through the
//! [`AbstractTask`] capability trait.
//!
//! ## Rules
//! - A task is in at most one of {queued, in-flight, done}; transitions are
//!   made under the task monitor.
//! - `finished` implies the executable has been released.
//! - Submission is monotonic: the flag is set at most once; a second attempt
//!   is an admission failure and leaves the state untouched.
//! - `wait_finish(false)` returns without blocking when called from the
//!   thread of the task's bound worker (self-wait deadlock prevention) or
//!   when the task was never submitted.

use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{RuntimeError, TaskError};
use crate::executor::{ExecutorInner, GroupInner};
use crate::pool::Worker;
use crate::priority::Priority;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// How a task is dispatched once it reaches the head of its queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutionMode {
    /// Runs inline on the drain worker.
    Sync = 0,
    /// Queued; a dedicated worker is started when the task is drained.
    Async = 1,
    /// Bypasses the queue; a dedicated worker is started at admission.
    PureAsync = 2,
}

impl ExecutionMode {
    fn from_u8(value: u8) -> ExecutionMode {
        match value {
            1 => ExecutionMode::Async,
            2 => ExecutionMode::PureAsync,
            _ => ExecutionMode::Sync,
        }
    }
}

/// The surface a task was created by; mutations route back through it.
#[derive(Clone)]
pub(crate) enum Owner {
    /// Created by a standalone executor.
    Executor(Weak<ExecutorInner>),
    /// Created by an executor group; priority/mode changes go through the
    /// group so cross-queue moves stay atomic.
    Group(Weak<GroupInner>),
}

pub(crate) struct Flags {
    pub(crate) submitted: bool,
    pub(crate) started: bool,
    pub(crate) finished: bool,
    pub(crate) aborted: bool,
}

/// State shared by every task variant.
pub(crate) struct TaskState {
    id: u64,
    owner: Owner,
    owner_label: String,
    monitor: Mutex<Flags>,
    cond: Condvar,
    mode: AtomicU8,
    priority: AtomicU8,
    error: Mutex<Option<TaskError>>,
    worker: Mutex<Option<Worker>>,
    creation_site: Option<Backtrace>,
}

impl TaskState {
    pub(crate) fn new(
        owner: Owner,
        owner_label: String,
        priority: Priority,
        tracking: bool,
    ) -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            owner,
            owner_label,
            monitor: Mutex::new(Flags {
                submitted: false,
                started: false,
                finished: false,
                aborted: false,
            }),
            cond: Condvar::new(),
            mode: AtomicU8::new(ExecutionMode::Sync as u8),
            priority: AtomicU8::new(priority.value()),
            error: Mutex::new(None),
            worker: Mutex::new(None),
            creation_site: tracking.then(Backtrace::force_capture),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn owner(&self) -> Owner {
        self.owner.clone()
    }

    pub(crate) fn owner_label(&self) -> &str {
        &self.owner_label
    }

    /// Locks the task monitor. Held by the drain while a task leaves the
    /// queue and by the group while a task moves between queues.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Flags> {
        self.monitor.lock()
    }

    pub(crate) fn mode(&self) -> ExecutionMode {
        ExecutionMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    pub(crate) fn set_mode(&self, mode: ExecutionMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    pub(crate) fn priority(&self) -> Priority {
        Priority::clamp_from(self.priority.load(Ordering::SeqCst))
    }

    pub(crate) fn set_priority(&self, priority: Priority) {
        self.priority.store(priority.value(), Ordering::SeqCst);
    }

    pub(crate) fn bind_worker(&self, worker: Worker) {
        *self.worker.lock() = Some(worker);
    }

    pub(crate) fn clear_worker(&self) {
        self.worker.lock().take();
    }

    pub(crate) fn worker(&self) -> Option<Worker> {
        self.worker.lock().clone()
    }

    pub(crate) fn is_submitted(&self) -> bool {
        self.monitor.lock().submitted
    }

    pub(crate) fn has_started(&self) -> bool {
        self.monitor.lock().started
    }

    pub(crate) fn has_finished_flag(&self) -> bool {
        self.monitor.lock().finished
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.monitor.lock().aborted
    }

    pub(crate) fn error(&self) -> Option<TaskError> {
        self.error.lock().clone()
    }

    pub(crate) fn creator_trace(&self) -> Option<String> {
        self.creation_site.as_ref().map(|bt| bt.to_string())
    }

    /// Marks the task submitted; fails when it already was.
    pub(crate) fn mark_submitted(&self) -> Result<(), RuntimeError> {
        let mut flags = self.monitor.lock();
        if flags.submitted {
            return Err(RuntimeError::AlreadySubmitted { task_id: self.id });
        }
        flags.submitted = true;
        Ok(())
    }

    /// Marks the task started. Returns `false` when the task is already done
    /// (e.g. aborted concurrently) and must not run.
    pub(crate) fn mark_started(&self) -> bool {
        let mut flags = self.monitor.lock();
        if flags.finished {
            return false;
        }
        flags.started = true;
        self.cond.notify_all();
        true
    }

    /// Records the outcome and releases waiters. The executable must already
    /// be gone by the time this is called.
    pub(crate) fn finish(&self, error: Option<TaskError>) {
        let mut flags = self.monitor.lock();
        flags.finished = true;
        *self.error.lock() = error;
        self.worker.lock().take();
        self.cond.notify_all();
    }

    /// Marks an unstarted task aborted (shutdown cleared it). Returns `false`
    /// when the task already started or finished.
    pub(crate) fn abort(&self) -> bool {
        let mut flags = self.monitor.lock();
        if flags.started || flags.finished {
            return false;
        }
        flags.aborted = true;
        flags.finished = true;
        *self.error.lock() = Some(TaskError::Aborted);
        self.worker.lock().take();
        self.cond.notify_all();
        true
    }

    /// Blocks until the task finishes.
    ///
    /// Returns immediately when the task was never submitted, and — unless
    /// `ignore_thread_check` — when the caller *is* the task's bound worker.
    pub(crate) fn wait_finish(&self, ignore_thread_check: bool) {
        loop {
            let mut flags = self.monitor.lock();
            if flags.finished || !flags.submitted {
                return;
            }
            if !ignore_thread_check {
                let current = thread::current().id();
                let self_wait = self
                    .worker
                    .lock()
                    .as_ref()
                    .and_then(|w| w.thread_id())
                    .is_some_and(|id| id == current);
                if self_wait {
                    return;
                }
            }
            self.cond.wait(&mut flags);
        }
    }
}

/// Capability set shared by every task variant; queues, drains and groups
/// operate on `Arc<dyn AbstractTask>`.
pub(crate) trait AbstractTask: Send + Sync {
    fn state(&self) -> &TaskState;

    /// Runs the executable, captures the outcome and releases waiters.
    fn execute(&self);

    /// Completion, consulting the once-only registry for keyed tasks.
    fn has_finished(&self) -> bool;

    /// Blocks until completion, consulting the once-only registry for keyed
    /// tasks (a duplicate waits on the winning admission).
    fn wait_for_finish(&self, ignore_thread_check: bool);

    /// Marks an unexecuted task aborted and releases its executable.
    fn abort(&self);

    /// Once-only identity, when configured.
    fn once_key(&self) -> Option<String> {
        None
    }

    /// Result of the "already executed?" probe; `false` without a key.
    fn once_probe(&self) -> bool {
        false
    }
}

/// Routes a priority change through the owning surface: group-owned tasks
/// move between queues atomically, everything else just rewrites the field.
/// Once-only tasks delegate to the effective (winning) task.
pub(crate) fn route_change_priority(task: &Arc<dyn AbstractTask>, priority: Priority) {
    if let Some(key) = task.once_key() {
        if let Some(effective) = super::effective_task(&key) {
            if effective.state().id() != task.state().id() {
                route_change_priority(&effective, priority);
                return;
            }
        }
    }
    match task.state().owner() {
        Owner::Group(group) => {
            if let Some(group) = group.upgrade() {
                group.change_task_priority(task, priority);
                return;
            }
            task.state().set_priority(priority);
        }
        Owner::Executor(_) => task.state().set_priority(priority),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_state() -> TaskState {
        TaskState::new(
            Owner::Executor(Weak::new()),
            "test".to_owned(),
            Priority::Normal,
            false,
        )
    }

    #[test]
    fn submission_is_monotonic() {
        let state = plain_state();
        assert!(state.mark_submitted().is_ok());
        let err = state.mark_submitted().unwrap_err();
        assert_eq!(err.as_label(), "runtime_already_submitted");
        assert!(state.is_submitted());
    }

    #[test]
    fn abort_only_hits_unstarted_tasks() {
        let state = plain_state();
        assert!(state.mark_submitted().is_ok());
        assert!(state.mark_started());
        assert!(!state.abort());
        state.finish(None);
        assert!(state.has_finished_flag());
        assert!(!state.is_aborted());

        let cleared = plain_state();
        assert!(cleared.mark_submitted().is_ok());
        assert!(cleared.abort());
        assert!(cleared.is_aborted());
        assert_eq!(cleared.error(), Some(TaskError::Aborted));
        assert!(!cleared.mark_started());
    }

    #[test]
    fn wait_finish_returns_for_unsubmitted_tasks() {
        let state = plain_state();
        // Would block forever if unsubmitted tasks were waited on.
        state.wait_finish(false);
    }

    #[test]
    fn tracking_captures_a_creation_site() {
        let state = TaskState::new(
            Owner::Executor(Weak::new()),
            "test".to_owned(),
            Priority::Normal,
            true,
        );
        assert!(state.creator_trace().is_some());
        assert!(plain_state().creator_trace().is_none());
    }
}

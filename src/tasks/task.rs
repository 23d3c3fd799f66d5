//! # Runnable task handle.
//!
//! [`Task`] wraps a fallible closure with no result. Configure it
//! (priority, execution mode, once-only identity), submit it to its owning
//! executor or group, then inspect or await completion.
//!
//! # Example
//! ```no_run
//! use backtask::{ExecutorGroup, Priority, TaskError, ThreadSupplier};
//!
//! let supplier = ThreadSupplier::from_settings("pool", Default::default()).unwrap();
//! let group = ExecutorGroup::create("jobs", supplier, true, false).unwrap();
//!
//! let task = group.create_task(
//!     || {
//!         println!("running in the background");
//!         Ok::<_, TaskError>(())
//!     },
//!     Priority::Normal,
//! );
//! task.submit().unwrap().wait_for_finish(false);
//! assert!(task.has_finished() && !task.ended_with_errors());
//! group.shut_down(true);
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RuntimeError, TaskError};
use crate::pool::panic_reason;
use crate::priority::Priority;
use crate::tasks::state::{route_change_priority, AbstractTask, ExecutionMode, Owner, TaskState};
use crate::tasks::{effective_task, remove_if_same, try_register};

type RunnableJob = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

/// Once-only identity: key plus the "already executed?" probe consulted when
/// the registry holds no entry (the winner completed and cleared itself, or
/// the effect predates this process's admissions).
#[derive(Clone)]
pub(crate) struct OnceBinding {
    pub(crate) key: String,
    pub(crate) probe: Arc<dyn Fn() -> bool + Send + Sync>,
}

pub(crate) struct RunnableCore {
    state: TaskState,
    executable: Mutex<Option<RunnableJob>>,
    once: Mutex<Option<OnceBinding>>,
}

impl RunnableCore {
    fn once_binding(&self) -> Option<OnceBinding> {
        self.once.lock().clone()
    }
}

impl AbstractTask for RunnableCore {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn execute(&self) {
        if !self.state.mark_started() {
            return;
        }
        let job = self.executable.lock().take();
        let error = match job {
            Some(job) => match catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(TaskError::Panicked {
                    reason: panic_reason(payload.as_ref()),
                }),
            },
            None => None,
        };
        if let Some(err) = &error {
            tracing::error!(
                task = self.state.id(),
                executor = %self.state.owner_label(),
                error = %err,
                "task execution failed"
            );
        }
        if let Some(once) = self.once_binding() {
            remove_if_same(&once.key, self.state.id());
        }
        self.state.finish(error);
    }

    fn has_finished(&self) -> bool {
        let Some(once) = self.once_binding() else {
            return self.state.has_finished_flag();
        };
        match effective_task(&once.key) {
            Some(effective) if effective.state().id() == self.state.id() => {
                self.state.has_finished_flag()
            }
            Some(effective) => effective.has_finished(),
            None => {
                // No live admission: the probe is authoritative, and this
                // handle's executable will never run.
                self.executable.lock().take();
                (once.probe)()
            }
        }
    }

    fn wait_for_finish(&self, ignore_thread_check: bool) {
        let Some(once) = self.once_binding() else {
            self.state.wait_finish(ignore_thread_check);
            return;
        };
        match effective_task(&once.key) {
            Some(effective) if effective.state().id() == self.state.id() => {
                self.state.wait_finish(ignore_thread_check);
            }
            Some(effective) => effective.state().wait_finish(ignore_thread_check),
            None => {}
        }
    }

    fn abort(&self) {
        if self.state.abort() {
            self.executable.lock().take();
            if let Some(once) = self.once_binding() {
                remove_if_same(&once.key, self.state.id());
            }
        }
    }

    fn once_key(&self) -> Option<String> {
        self.once.lock().as_ref().map(|b| b.key.clone())
    }

    fn once_probe(&self) -> bool {
        self.once.lock().as_ref().is_some_and(|b| (b.probe)())
    }
}

/// A runnable background task. Clones share the same task.
#[derive(Clone)]
pub struct Task {
    core: Arc<RunnableCore>,
}

impl Task {
    pub(crate) fn new<F>(
        owner: Owner,
        owner_label: String,
        priority: Priority,
        tracking: bool,
        executable: F,
    ) -> Self
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        Self {
            core: Arc::new(RunnableCore {
                state: TaskState::new(owner, owner_label, priority, tracking),
                executable: Mutex::new(Some(Box::new(executable))),
                once: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn abstract_task(&self) -> Arc<dyn AbstractTask> {
        self.core.clone() as Arc<dyn AbstractTask>
    }

    /// Unique id of this task.
    pub fn id(&self) -> u64 {
        self.core.state.id()
    }

    /// Hands the task to its owning queue. Monotonic: a second call fails
    /// with [`RuntimeError::AlreadySubmitted`] and changes nothing.
    ///
    /// For once-only tasks a duplicate admission is a successful no-op; the
    /// handle then observes the winning task.
    pub fn submit(&self) -> Result<&Self, RuntimeError> {
        submit_abstract(&self.abstract_task(), &self.core.state)?;
        Ok(self)
    }

    /// Blocks until the task finishes. With `ignore_thread_check == false`
    /// the call returns immediately when made from the task's own worker.
    /// Once-only duplicates wait on the winning admission.
    pub fn wait_for_finish(&self, ignore_thread_check: bool) -> &Self {
        self.core.wait_for_finish(ignore_thread_check);
        self
    }

    /// Changes the task priority. While queued in a group, the task moves
    /// atomically to the queue of the new tier.
    pub fn change_priority(&self, priority: Priority) -> &Self {
        route_change_priority(&self.abstract_task(), priority);
        self
    }

    /// Changes how the task is dispatched. While queued in a group, the
    /// worker binding is rebound accordingly; [`ExecutionMode::PureAsync`]
    /// set before submission skips the queue entirely.
    pub fn set_execution_mode(&self, mode: ExecutionMode) -> &Self {
        if let Some(once) = self.core.once_binding() {
            if let Some(effective) = effective_task(&once.key) {
                if effective.state().id() != self.core.state.id() {
                    self.core.state.set_mode(mode);
                    return self;
                }
            }
        }
        match self.core.state.owner() {
            Owner::Group(group) => {
                if let Some(group) = group.upgrade() {
                    group.change_task_mode(&self.abstract_task(), mode);
                } else {
                    self.core.state.set_mode(mode);
                }
            }
            Owner::Executor(_) => self.core.state.set_mode(mode),
        }
        self
    }

    /// Gives the task a once-only identity: across all admissions sharing
    /// `key`, at most one runs until it completes and clears the registry.
    /// `probe` reports whether the keyed effect already happened.
    pub fn run_only_once<P>(&self, key: impl Into<String>, probe: P) -> &Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        *self.core.once.lock() = Some(OnceBinding {
            key: key.into(),
            probe: Arc::new(probe),
        });
        self
    }

    /// The captured failure, if the execution ended with one.
    pub fn error(&self) -> Option<TaskError> {
        self.core.state.error()
    }

    /// True when the execution failed or the task was aborted.
    pub fn ended_with_errors(&self) -> bool {
        self.core.state.error().is_some()
    }

    /// True once [`Task::submit`] succeeded.
    pub fn is_submitted(&self) -> bool {
        self.core.state.is_submitted()
    }

    /// True once the executable began running.
    pub fn has_started(&self) -> bool {
        self.core.state.has_started()
    }

    /// True once the task completed (or aborted). Once-only tasks consult
    /// the registry and their probe.
    pub fn has_finished(&self) -> bool {
        self.core.has_finished()
    }

    /// True when a shutdown cleared the task before it ran.
    pub fn is_aborted(&self) -> bool {
        self.core.state.is_aborted()
    }

    /// Current priority tier.
    pub fn priority(&self) -> Priority {
        self.core.state.priority()
    }

    /// Current execution mode.
    pub fn execution_mode(&self) -> ExecutionMode {
        self.core.state.mode()
    }

    /// Backtrace captured at creation, when tracking was enabled on the
    /// owning surface.
    pub fn creator_trace(&self) -> Option<String> {
        self.core.state.creator_trace()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .field("mode", &self.execution_mode())
            .field("submitted", &self.is_submitted())
            .field("finished", &self.has_finished())
            .finish()
    }
}

/// Shared submission path: routes the task to its owning executor (or the
/// group executor matching its current priority).
pub(crate) fn submit_abstract(
    task: &Arc<dyn AbstractTask>,
    state: &TaskState,
) -> Result<(), RuntimeError> {
    match state.owner() {
        Owner::Executor(executor) => {
            let executor = executor
                .upgrade()
                .ok_or_else(|| RuntimeError::ExecutorShutDown {
                    name: state.owner_label().to_owned(),
                })?;
            executor.submit_task(Arc::clone(task))
        }
        Owner::Group(group) => {
            let group = group.upgrade().ok_or_else(|| RuntimeError::ExecutorShutDown {
                name: state.owner_label().to_owned(),
            })?;
            group.by_priority(state.priority()).submit_task(Arc::clone(task))
        }
    }
}

/// Once-only admission check used by executors: a keyed task is executable
/// when its effect is not already done and it wins the registry insert;
/// anything else is executable unless already finished.
pub(crate) fn can_be_executed(task: &Arc<dyn AbstractTask>) -> bool {
    if let Some(key) = task.once_key() {
        return !task.once_probe() && try_register(&key, Arc::clone(task));
    }
    !task.has_finished()
}

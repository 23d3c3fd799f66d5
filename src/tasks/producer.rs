//! # Producer task handle.
//!
//! [`ProducerTask`] runs a fallible closure producing a value. The result is
//! cached on the task; [`ProducerTask::join`] waits for completion and
//! returns a copy, any number of times.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RuntimeError, TaskError};
use crate::pool::panic_reason;
use crate::priority::Priority;
use crate::tasks::state::{route_change_priority, AbstractTask, ExecutionMode, Owner, TaskState};
use crate::tasks::task::submit_abstract;

type ProducerJob<T> = Box<dyn FnOnce() -> Result<T, TaskError> + Send + 'static>;

pub(crate) struct ProducerCore<T> {
    state: TaskState,
    executable: Mutex<Option<ProducerJob<T>>>,
    result: Mutex<Option<T>>,
}

impl<T: Send + 'static> AbstractTask for ProducerCore<T> {
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
                Ok(Ok(value)) => {
                    *self.result.lock() = Some(value);
                    None
                }
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
                "producer task execution failed"
            );
        }
        self.state.finish(error);
    }

    fn has_finished(&self) -> bool {
        self.state.has_finished_flag()
    }

    fn wait_for_finish(&self, ignore_thread_check: bool) {
        self.state.wait_finish(ignore_thread_check);
    }

    fn abort(&self) {
        if self.state.abort() {
            self.executable.lock().take();
        }
    }
}

/// A background task producing a `T`. Clones share the same task.
pub struct ProducerTask<T> {
    core: Arc<ProducerCore<T>>,
}

impl<T> Clone for ProducerTask<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Send + 'static> ProducerTask<T> {
    pub(crate) fn new<F>(
        owner: Owner,
        owner_label: String,
        priority: Priority,
        tracking: bool,
        executable: F,
    ) -> Self
    where
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        Self {
            core: Arc::new(ProducerCore {
                state: TaskState::new(owner, owner_label, priority, tracking),
                executable: Mutex::new(Some(Box::new(executable))),
                result: Mutex::new(None),
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

    /// Hands the task to its owning queue. Monotonic; see
    /// [`Task::submit`](crate::Task::submit).
    pub fn submit(&self) -> Result<&Self, RuntimeError> {
        submit_abstract(&self.abstract_task(), &self.core.state)?;
        Ok(self)
    }

    /// Blocks until the task finishes; self-wait-safe like
    /// [`Task::wait_for_finish`](crate::Task::wait_for_finish).
    pub fn wait_for_finish(&self, ignore_thread_check: bool) -> &Self {
        self.core.state.wait_finish(ignore_thread_check);
        self
    }

    /// Changes the task priority. While queued in a group, the task moves
    /// atomically to the queue of the new tier.
    pub fn change_priority(&self, priority: Priority) -> &Self {
        route_change_priority(&self.abstract_task(), priority);
        self
    }

    /// Changes how the task is dispatched.
    pub fn set_execution_mode(&self, mode: ExecutionMode) -> &Self {
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

    /// Waits for completion and returns the cached result. `None` when the
    /// producer failed, panicked or was aborted.
    pub fn join(&self) -> Option<T>
    where
        T: Clone,
    {
        self.core.state.wait_finish(false);
        self.core.result.lock().clone()
    }

    /// Takes the result out of the task, leaving `None` behind. Does not
    /// wait; pair with [`ProducerTask::wait_for_finish`] when needed.
    pub fn take_result(&self) -> Option<T> {
        self.core.result.lock().take()
    }

    /// Peeks at the result without waiting.
    pub fn try_result(&self) -> Option<T>
    where
        T: Clone,
    {
        self.core.result.lock().clone()
    }

    /// The captured failure, if the execution ended with one.
    pub fn error(&self) -> Option<TaskError> {
        self.core.state.error()
    }

    /// True when the execution failed or the task was aborted.
    pub fn ended_with_errors(&self) -> bool {
        self.core.state.error().is_some()
    }

    /// True once [`ProducerTask::submit`] succeeded.
    pub fn is_submitted(&self) -> bool {
        self.core.state.is_submitted()
    }

    /// True once the executable began running.
    pub fn has_started(&self) -> bool {
        self.core.state.has_started()
    }

    /// True once the task completed (or aborted).
    pub fn has_finished(&self) -> bool {
        self.core.state.has_finished_flag()
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

    /// Backtrace captured at creation, when tracking was enabled.
    pub fn creator_trace(&self) -> Option<String> {
        self.core.state.creator_trace()
    }
}

impl<T: Send + 'static> std::fmt::Debug for ProducerTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerTask")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .field("mode", &self.execution_mode())
            .field("submitted", &self.is_submitted())
            .field("finished", &self.has_finished())
            .finish()
    }
}

//! # Tasks: the units of work accepted by executors.
//!
//! This module provides the task-related types:
//! - [`Task`] — a runnable task (no result), optionally once-only
//! - [`ProducerTask`] — a task producing a value, joinable for the result
//! - [`TaskRef`] — type-erased handle accepted by executor/group operations
//! - [`ExecutionMode`] — how a task is dispatched (inline, queued worker,
//!   queue-bypassing worker)
//!
//! Both handle types share the same internal state machine
//! (created → submitted → queued → running → finished/aborted) and are cheap
//! to clone; clones observe the same task.

mod once;
mod producer;
mod state;
mod task;

pub use producer::ProducerTask;
pub use state::ExecutionMode;
pub use task::Task;

pub(crate) use once::{effective_task, remove_if_same, try_register};
pub(crate) use state::{route_change_priority, AbstractTask, Owner};
pub(crate) use task::can_be_executed;

use std::sync::Arc;

/// Type-erased, shared handle to any task, accepted by executor and group
/// operations such as `wait_for`.
#[derive(Clone)]
pub struct TaskRef {
    pub(crate) inner: Arc<dyn AbstractTask>,
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        TaskRef {
            inner: task.abstract_task(),
        }
    }
}

impl<T: Send + 'static> From<&ProducerTask<T>> for TaskRef {
    fn from(task: &ProducerTask<T>) -> Self {
        TaskRef {
            inner: task.abstract_task(),
        }
    }
}

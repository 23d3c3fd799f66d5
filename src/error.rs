//! # Error types used by the executor runtime and tasks.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`] errors raised by the execution framework itself
//!   (admission, configuration, worker spawning).
//! - [`TaskError`] failures captured on an individual task execution.
//!
//! Both types provide an `as_label` helper returning a short stable
//! snake_case label for logs.
//!
//! Executable failures never propagate out of the drain loop or a worker:
//! they are stored on the task, logged with the task identity, and surfaced
//! to callers through [`Task::error`](crate::Task::error) /
//! [`Task::ended_with_errors`](crate::Task::ended_with_errors).

use std::io;

use thiserror::Error;

/// # Errors produced by the execution framework.
///
/// These represent failures of the orchestration machinery, as opposed to
/// failures of user executables (see [`TaskError`]).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A task was submitted a second time. Submission is monotonic: it may
    /// succeed at most once per task.
    #[error("task {task_id} has already been submitted")]
    AlreadySubmitted {
        /// Unique id of the offending task.
        task_id: u64,
    },

    /// A task was submitted to an executor that has been shut down.
    #[error("executor '{name}' has been shut down")]
    ExecutorShutDown {
        /// Name of the terminated executor.
        name: String,
    },

    /// A configuration value is missing, unparsable or out of range.
    #[error("invalid configuration for '{key}': {reason}")]
    Configuration {
        /// The offending configuration key.
        key: String,
        /// What was wrong with the value.
        reason: String,
    },

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread '{name}'")]
    Spawn {
        /// Name the thread would have carried.
        name: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AlreadySubmitted { .. } => "runtime_already_submitted",
            RuntimeError::ExecutorShutDown { .. } => "runtime_executor_shut_down",
            RuntimeError::Configuration { .. } => "runtime_configuration",
            RuntimeError::Spawn { .. } => "runtime_spawn",
        }
    }
}

/// # Failures captured on a task execution.
///
/// Stored on the task when its executable returns an error or panics, or when
/// the task is cleared unexecuted at shutdown. Inspect via
/// [`Task::error`](crate::Task::error) after completion.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The executable returned an error.
    #[error("execution failed: {reason}")]
    Fail {
        /// Failure description supplied by the executable.
        reason: String,
    },

    /// The executable panicked; the panic was caught on the worker.
    #[error("executable panicked: {reason}")]
    Panicked {
        /// Stringified panic payload.
        reason: String,
    },

    /// The task was cleared from the queue by a shutdown before it ran.
    #[error("aborted before execution")]
    Aborted,
}

impl TaskError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Aborted => "task_aborted",
        }
    }

    /// True when the task never ran (shutdown cleared it).
    pub fn is_aborted(&self) -> bool {
        matches!(self, TaskError::Aborted)
    }

    /// Builds a `Fail` from anything displayable.
    pub fn fail(reason: impl std::fmt::Display) -> Self {
        TaskError::Fail {
            reason: reason.to_string(),
        }
    }
}

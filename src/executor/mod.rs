//! # Executors: per-priority queued drains and the three-tier group.
//!
//! [`QueuedExecutor`] owns one FIFO task queue and one drain worker; tasks
//! are admitted, drained in enqueue order, and dispatched inline or onto
//! supplier workers according to their execution mode.
//! [`ExecutorGroup`] fans out over three executors (low/normal/high) and is
//! the primary surface for cross-priority mutation.

mod group;
mod queued;

pub use group::ExecutorGroup;
pub use queued::QueuedExecutor;

pub(crate) use group::GroupInner;
pub(crate) use queued::ExecutorInner;

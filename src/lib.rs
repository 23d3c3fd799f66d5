//! # backtask
//!
//! **Backtask** is a priority-aware, pool-backed background task executor.
//!
//! It accepts user-supplied callables, schedules them on worker threads at
//! three priority tiers, supports cooperative suspension and resumption, and
//! drains deterministically on shutdown. Workers come from a hybrid pool
//! that recycles parked threads and grows a bounded detached budget under
//! contention.
//!
//! ## Features
//!
//! | Area               | Description                                                         | Key types                               |
//! |--------------------|---------------------------------------------------------------------|-----------------------------------------|
//! | **Tasks**          | Runnable and producer tasks with priority, mode, once-only identity | [`Task`], [`ProducerTask`], [`TaskRef`] |
//! | **Executors**      | Per-priority FIFO drain with suspension, escalation, shutdown       | [`QueuedExecutor`], [`ExecutorGroup`]   |
//! | **Worker pool**    | Poolable/detached workers with adaptive cap growth and decay        | [`ThreadSupplier`], [`Worker`]          |
//! | **Keyed mutexes**  | Stable monitor per string id                                        | [`Synchronizer`], [`Monitor`]           |
//! | **Configuration**  | Typed settings plus `${...}`-resolving string properties            | [`SupplierSettings`], [`resolve_value`] |
//! | **Errors**         | Framework vs task-execution failures                                | [`RuntimeError`], [`TaskError`]         |
//!
//! ```no_run
//! use backtask::{ExecutorGroup, Priority, TaskError, ThreadSupplier};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let supplier = ThreadSupplier::from_settings("pool", Default::default())?;
//!     let group = ExecutorGroup::create("jobs", supplier, true, false)?;
//!
//!     let answer = group.create_producer_task(
//!         || Ok::<_, TaskError>(6 * 7),
//!         Priority::Normal,
//!     );
//!     answer.submit()?;
//!     assert_eq!(answer.join(), Some(42));
//!
//!     group.shut_down(true);
//!     Ok(())
//! }
//! ```
//!
//! ---

mod config;
mod error;
mod executor;
mod pool;
mod priority;
mod synchronizer;
mod tasks;

// ---- Public re-exports ----

pub use config::{keys, resolve_value, DetachedCount, Properties, SupplierSettings, ThreadCount};
pub use error::{RuntimeError, TaskError};
pub use executor::{ExecutorGroup, QueuedExecutor};
pub use pool::{ThreadSupplier, Worker, WorkerKind};
pub use priority::Priority;
pub use synchronizer::{Monitor, Synchronizer};
pub use tasks::{ExecutionMode, ProducerTask, Task, TaskRef};

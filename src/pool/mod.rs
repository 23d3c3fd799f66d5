//! # Worker pool: poolable/detached workers and the thread supplier.
//!
//! [`ThreadSupplier`] multiplexes a bounded pool of reusable ("poolable")
//! workers with an elastically bounded set of single-use ("detached")
//! workers. Poolable workers park on their own monitor between assignments
//! and are republished into a sleeping-slot array; detached workers run one
//! job and exit. Saturation is relieved by a bounded wait followed by
//! adaptive growth of the detached cap, which later decays back toward its
//! initial value after a period of quiescence.

mod supplier;
mod worker;

pub use supplier::ThreadSupplier;
pub use worker::{Worker, WorkerKind};

pub(crate) use worker::panic_reason;

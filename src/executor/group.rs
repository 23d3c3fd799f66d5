//! # Executor group: three-tier fan-out.
//!
//! [`ExecutorGroup`] owns one [`QueuedExecutor`](crate::QueuedExecutor) per
//! priority tier and is the primary surface for task creation and
//! cross-priority mutation: a priority change moves a queued task atomically
//! between tier queues (under the task's monitor), a mode change rebinds the
//! worker binding while the queue slot is held.
//!
//! Tiers are independent: FIFO holds within a tier, nothing is guaranteed
//! across tiers.

use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{RuntimeError, TaskError};
use crate::executor::queued::ExecutorInner;
use crate::executor::QueuedExecutor;
use crate::pool::ThreadSupplier;
use crate::priority::Priority;
use crate::synchronizer::Synchronizer;
use crate::tasks::{
    route_change_priority, AbstractTask, ExecutionMode, Owner, ProducerTask, Task, TaskRef,
};

/// Tasks executed between progress logs, per tier: the busier the tier is
/// expected to be, the rarer the log line.
const LOGGING_THRESHOLDS: [(Priority, u64); 3] = [
    (Priority::Low, 1000),
    (Priority::Normal, 100),
    (Priority::High, 10),
];

pub(crate) struct GroupInner {
    name: String,
    /// One executor per tier, indexed `[low, normal, high]`.
    executors: [QueuedExecutor; 3],
    shut: AtomicBool,
    creation_site: Option<&'static Location<'static>>,
}

impl GroupInner {
    pub(crate) fn by_priority(&self, priority: Priority) -> &Arc<ExecutorInner> {
        let index = match priority {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        };
        self.executors[index].inner()
    }

    fn executor(&self, priority: Priority) -> &QueuedExecutor {
        let index = match priority {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        };
        &self.executors[index]
    }

    /// Moves a task to the queue of its new tier, atomically under the
    /// task's monitor. A task that is not currently queued only gets its
    /// priority field rewritten (it will dispatch wherever it already is).
    pub(crate) fn change_task_priority(&self, task: &Arc<dyn AbstractTask>, priority: Priority) {
        let old = task.state().priority();
        task.state().set_priority(priority);
        if old == priority {
            return;
        }
        let _monitor = task.state().lock();
        if self.by_priority(old).queue_remove(task) {
            if let Err(e) = self.by_priority(priority).enqueue(Arc::clone(task)) {
                tracing::warn!(
                    group = %self.name,
                    task = task.state().id(),
                    error = %e,
                    "failed to requeue task after priority change"
                );
            }
        }
    }

    /// Rewrites the execution mode; while the task is queued, its worker
    /// binding is rebound under the task's monitor.
    pub(crate) fn change_task_mode(&self, task: &Arc<dyn AbstractTask>, mode: ExecutionMode) {
        if task.state().mode() == mode {
            return;
        }
        task.state().set_mode(mode);
        let _monitor = task.state().lock();
        let executor = self.by_priority(task.state().priority());
        if executor.queue_contains(task) {
            executor.bind_for_mode(task);
        }
    }
}

/// Fixed fan-out of three executors, one per priority tier. Clones share the
/// group.
#[derive(Clone)]
pub struct ExecutorGroup {
    inner: Arc<GroupInner>,
}

impl ExecutorGroup {
    /// Creates a group named `name` with one executor per tier, all drawing
    /// workers from `supplier`.
    ///
    /// With `undestroyable == true` the creation site is recorded and
    /// [`ExecutorGroup::shut_down`] refuses every other caller file.
    #[track_caller]
    pub fn create(
        name: impl Into<String>,
        supplier: Arc<ThreadSupplier>,
        daemon: bool,
        undestroyable: bool,
    ) -> Result<Self, RuntimeError> {
        let name = name.into();
        let creation_site = if undestroyable {
            Some(Location::caller())
        } else {
            None
        };
        let synchronizer = Synchronizer::new();
        let mut executors = Vec::with_capacity(3);
        for (tier, threshold) in LOGGING_THRESHOLDS {
            executors.push(QueuedExecutor::build(
                format!("{name} - {tier} priority tasks executor"),
                format!("{name} - {tier} priority async tasks executor"),
                Arc::clone(&supplier),
                Arc::clone(&synchronizer),
                tier,
                daemon,
                threshold,
                true,
                creation_site,
            )?);
        }
        let executors: [QueuedExecutor; 3] = executors
            .try_into()
            .unwrap_or_else(|_| unreachable!("exactly three executors are built"));
        Ok(Self {
            inner: Arc::new(GroupInner {
                name,
                executors,
                shut: AtomicBool::new(false),
                creation_site,
            }),
        })
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The executor serving `priority`.
    pub fn executor(&self, priority: Priority) -> &QueuedExecutor {
        self.inner.executor(priority)
    }

    /// Creates a runnable task owned by the group, bound to the tier of
    /// `priority`. Callers holding a raw numeric priority clamp it first via
    /// [`Priority::clamp_from`].
    pub fn create_task<F>(&self, executable: F, priority: Priority) -> Task
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        Task::new(
            Owner::Group(Arc::downgrade(&self.inner)),
            self.inner.name.clone(),
            priority,
            self.inner.by_priority(priority).tracking_enabled(),
            executable,
        )
    }

    /// Creates a producer task owned by the group, bound to the tier of
    /// `priority`.
    pub fn create_producer_task<T, F>(&self, executable: F, priority: Priority) -> ProducerTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        ProducerTask::new(
            Owner::Group(Arc::downgrade(&self.inner)),
            self.inner.name.clone(),
            priority,
            self.inner.by_priority(priority).tracking_enabled(),
            executable,
        )
    }

    /// Raises `task` to `priority` (moving it between queues when needed)
    /// and waits for it to finish.
    pub fn wait_for(&self, task: impl Into<TaskRef>, priority: Priority) {
        let task = task.into().inner;
        if task.state().priority() != priority {
            route_change_priority(&task, priority);
        }
        task.wait_for_finish(false);
    }

    /// Waits every executor in turn at `priority`. With
    /// `wait_for_new_added`, the pass repeats until all executors observe a
    /// complete drain in the same pass.
    pub fn wait_for_tasks_ending(&self, priority: Priority, wait_for_new_added: bool) {
        loop {
            for tier in Priority::ALL {
                if tier != priority {
                    self.inner
                        .by_priority(tier)
                        .wait_for_tasks_ending(priority, wait_for_new_added);
                }
            }
            self.inner
                .by_priority(priority)
                .wait_for_tasks_ending(priority, wait_for_new_added);
            if !wait_for_new_added {
                return;
            }
            let pending = Priority::ALL.iter().any(|tier| {
                let executor = self.inner.by_priority(*tier);
                executor.queue_len() > 0 || executor.in_flight_len() > 0
            });
            if !pending {
                return;
            }
        }
    }

    /// Enables or disables creation-site capture on tasks created from now
    /// on, across all tiers.
    pub fn set_task_creation_tracking(&self, enabled: bool) {
        for executor in &self.inner.executors {
            executor.set_task_creation_tracking(enabled);
        }
    }

    /// Logs executed/unexecuted counts for every tier.
    pub fn log_queues_info(&self) {
        for executor in &self.inner.executors {
            executor.log_queue_info();
        }
    }

    /// True once the group has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut.load(Ordering::SeqCst)
    }

    /// Shuts down every executor. Returns `false` when an undestroyable
    /// group refuses the caller.
    #[track_caller]
    pub fn shut_down(&self, wait_for_tasks_termination: bool) -> bool {
        let caller = Location::caller();
        if let Some(site) = self.inner.creation_site {
            if site.file() != caller.file() {
                tracing::warn!(
                    group = %self.inner.name,
                    caller = %caller.file(),
                    "shutdown refused: group is undestroyable outside its creation site"
                );
                return false;
            }
        }
        for tier in Priority::ALL {
            self.inner
                .by_priority(tier)
                .shut_down(wait_for_tasks_termination, caller);
        }
        self.inner.shut.store(true, Ordering::SeqCst);
        true
    }
}

//! Executor and group behavior: FIFO draining, suspension/resume,
//! escalation, cross-queue priority moves, queue-bypassing dispatch and
//! shutdown finality.

#[path = "helpers/foreign.rs"]
mod foreign;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use backtask::{
    DetachedCount, ExecutionMode, ExecutorGroup, Priority, QueuedExecutor, SupplierSettings,
    ThreadCount, ThreadSupplier,
};

fn supplier(name: &str) -> Arc<ThreadSupplier> {
    ThreadSupplier::from_settings(
        name,
        SupplierSettings {
            max_poolable: ThreadCount::Fixed(4),
            max_detached: DetachedCount::Fixed(16),
            request_timeout: Duration::from_millis(500),
            daemon: true,
            increasing_step: 2,
            decay_threshold: Duration::from_millis(30_000),
        },
    )
    .unwrap()
}

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn sync_tasks_run_in_submission_order() {
    let group = ExecutorGroup::create("fifo", supplier("fifo"), true, false).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..1000usize {
        let order = Arc::clone(&order);
        group
            .create_task(
                move || {
                    order.lock().unwrap().push(i);
                    Ok(())
                },
                Priority::Normal,
            )
            .submit()
            .unwrap();
    }
    group.wait_for_tasks_ending(Priority::Normal, true);

    let order = order.lock().unwrap();
    assert_eq!(order.len(), 1000);
    assert!(order.windows(2).all(|w| w[0] < w[1]));
    group.shut_down(true);
}

#[test]
fn immediate_suspension_waits_for_the_running_task_and_holds_new_ones() {
    let executor = QueuedExecutor::create(
        "susp",
        "susp - async",
        supplier("susp"),
        Priority::Normal,
        true,
        100,
        false,
    )
    .unwrap();

    let sleeper = executor.create_task(|| {
        std::thread::sleep(Duration::from_millis(400));
        Ok(())
    });
    sleeper.submit().unwrap();
    assert!(wait_until(Duration::from_secs(2), || sleeper.has_started()));

    executor.suspend(true, Priority::Normal);
    // Suspension completes only once the in-progress task has finished.
    assert!(sleeper.has_finished());
    assert!(executor.is_suspended());

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        executor
            .create_task(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .submit()
            .unwrap();
    }
    // Submissions accumulate without starting while suspended.
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(executor.queued_count(), 3);

    executor.resume();
    executor.wait_for_tasks_ending(Priority::Normal, true);
    assert_eq!(ran.load(Ordering::SeqCst), 3);
    executor.shut_down(true);
}

#[test]
fn wait_for_escalates_queued_predecessors() {
    let executor = QueuedExecutor::create(
        "escalation",
        "escalation - async",
        supplier("escalation"),
        Priority::Low,
        true,
        100,
        false,
    )
    .unwrap();

    let blocker = executor.create_task(|| {
        std::thread::sleep(Duration::from_millis(300));
        Ok(())
    });
    blocker.submit().unwrap();
    let a = executor.create_task(|| Ok(()));
    let b = executor.create_task(|| Ok(()));
    let c = executor.create_task(|| Ok(()));
    a.submit().unwrap();
    b.submit().unwrap();
    c.submit().unwrap();
    assert!(wait_until(Duration::from_secs(2), || blocker.has_started()));

    executor.wait_for(&c, Priority::High);
    assert!(c.has_finished());
    // Everything queued before c was raised to the waiter's priority.
    assert_eq!(a.priority(), Priority::High);
    assert_eq!(b.priority(), Priority::High);
    executor.shut_down(true);
}

#[test]
fn group_priority_change_moves_a_queued_task_between_tiers() {
    let group = ExecutorGroup::create("move", supplier("move"), true, false).unwrap();

    // Hold the normal tier so the task stays queued there.
    group.executor(Priority::Normal).suspend(true, Priority::Normal);

    let ran = Arc::new(AtomicBool::new(false));
    let task = {
        let ran = Arc::clone(&ran);
        group.create_task(
            move || {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            },
            Priority::Normal,
        )
    };
    task.submit().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(group.executor(Priority::Normal).queued_count(), 1);

    // Moving the task to the high tier lets it run although the normal
    // drain is still suspended.
    task.change_priority(Priority::High);
    task.wait_for_finish(false);
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(task.priority(), Priority::High);
    assert_eq!(group.executor(Priority::Normal).queued_count(), 0);

    group.executor(Priority::Normal).resume();
    group.shut_down(true);
}

#[test]
fn pure_async_bypasses_the_queue_even_while_suspended() {
    let executor = QueuedExecutor::create(
        "bypass",
        "bypass - async",
        supplier("bypass"),
        Priority::Normal,
        true,
        100,
        false,
    )
    .unwrap();
    executor.suspend(true, Priority::Normal);

    let ran = Arc::new(AtomicBool::new(false));
    let task = {
        let ran = Arc::clone(&ran);
        executor.create_task(move || {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        })
    };
    task.set_execution_mode(ExecutionMode::PureAsync);
    task.submit().unwrap();

    assert!(wait_until(Duration::from_secs(2), || ran.load(Ordering::SeqCst)));
    assert_eq!(executor.queued_count(), 0);
    assert!(wait_until(Duration::from_secs(2), || {
        executor.in_flight_count() == 0
    }));
    executor.resume();
    executor.shut_down(true);
}

#[test]
fn graceful_shutdown_executes_everything_pending() {
    let executor = QueuedExecutor::create(
        "drain-all",
        "drain-all - async",
        supplier("drain-all"),
        Priority::Normal,
        true,
        100,
        false,
    )
    .unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let ran = Arc::clone(&ran);
        executor
            .create_task(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .submit()
            .unwrap();
    }
    assert!(executor.shut_down(true));
    assert_eq!(ran.load(Ordering::SeqCst), 10);
    assert_eq!(executor.queued_count(), 0);
}

#[test]
fn immediate_shutdown_aborts_pending_tasks_and_rejects_new_ones() {
    let executor = QueuedExecutor::create(
        "halt",
        "halt - async",
        supplier("halt"),
        Priority::Normal,
        true,
        100,
        false,
    )
    .unwrap();

    let first = executor.create_task(|| {
        std::thread::sleep(Duration::from_millis(200));
        Ok(())
    });
    first.submit().unwrap();
    let pending: Vec<_> = (0..4)
        .map(|_| {
            let task = executor.create_task(|| Ok(()));
            task.submit().unwrap();
            task
        })
        .collect();
    assert!(wait_until(Duration::from_secs(2), || first.has_started()));

    assert!(executor.shut_down(false));
    // The running task was not preempted; the queued ones never started.
    assert!(first.has_finished() && !first.ended_with_errors());
    for task in &pending {
        assert!(task.is_aborted());
        assert!(task.ended_with_errors());
        // Aborted tasks release their waiters instead of hanging them.
        task.wait_for_finish(false);
    }

    let late = executor.create_task(|| Ok(()));
    let err = late.submit().unwrap_err();
    assert_eq!(err.as_label(), "runtime_executor_shut_down");
}

#[test]
fn undestroyable_group_ignores_foreign_shutdown() {
    let group = ExecutorGroup::create("locked", supplier("locked"), true, true).unwrap();
    assert!(!foreign::try_shutdown(&group));
    assert!(!group.is_shut_down());
    // The creating file may still tear it down.
    assert!(group.shut_down(true));
    assert!(group.is_shut_down());
}

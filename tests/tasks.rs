//! Task semantics: producer results, once-only de-duplication, submission
//! monotonicity, self-wait safety, error capture and creation tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backtask::{
    DetachedCount, ExecutorGroup, Priority, SupplierSettings, Task, TaskError, ThreadCount,
    ThreadSupplier,
};

static ONCE_KEY_SEQ: AtomicUsize = AtomicUsize::new(0);

fn unique_key(prefix: &str) -> String {
    format!("{prefix}-{}", ONCE_KEY_SEQ.fetch_add(1, Ordering::SeqCst))
}

fn group(name: &str) -> ExecutorGroup {
    let supplier = ThreadSupplier::from_settings(
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
    .unwrap();
    ExecutorGroup::create(name, supplier, true, false).unwrap()
}

#[test]
fn producer_result_is_cached_across_joins() {
    let group = group("producer");
    let task = group.create_producer_task(|| Ok(42), Priority::Normal);
    task.submit().unwrap();

    // Join from another thread first, then again from this one: same value.
    let handle = {
        let task = task.clone();
        std::thread::spawn(move || task.join())
    };
    assert_eq!(handle.join().unwrap(), Some(42));
    assert_eq!(task.join(), Some(42));
    assert!(task.has_finished() && !task.ended_with_errors());
    group.shut_down(true);
}

#[test]
fn once_only_concurrent_submissions_run_exactly_once() {
    let group = group("once");
    let key = unique_key("K");
    let executed = Arc::new(AtomicUsize::new(0));

    let make_task = |group: &ExecutorGroup| -> Task {
        let executed = Arc::clone(&executed);
        let probe_counter = Arc::clone(&executed);
        let task = group.create_task(
            move || {
                executed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Priority::Normal,
        );
        task.run_only_once(key.clone(), move || {
            probe_counter.load(Ordering::SeqCst) > 0
        });
        task
    };
    let first = make_task(&group);
    let second = make_task(&group);

    let submitters: Vec<_> = [first.clone(), second.clone()]
        .into_iter()
        .map(|task| {
            std::thread::spawn(move || {
                task.submit().unwrap();
                task.wait_for_finish(false);
            })
        })
        .collect();
    for handle in submitters {
        handle.join().unwrap();
    }

    assert_eq!(executed.load(Ordering::SeqCst), 1);
    assert!(first.has_finished());
    assert!(second.has_finished());
    group.shut_down(true);
}

#[test]
fn second_submit_fails_and_does_not_enqueue() {
    let group = group("double-submit");
    let runs = Arc::new(AtomicUsize::new(0));
    let task = {
        let runs = Arc::clone(&runs);
        group.create_task(
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Priority::Normal,
        )
    };
    task.submit().unwrap();
    let err = task.submit().unwrap_err();
    assert_eq!(err.as_label(), "runtime_already_submitted");

    group.wait_for_tasks_ending(Priority::Normal, true);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    group.shut_down(true);
}

#[test]
fn waiting_on_yourself_returns_instead_of_deadlocking() {
    let group = group("self-wait");
    let slot: Arc<Mutex<Option<Task>>> = Arc::new(Mutex::new(None));
    let observed_return = Arc::new(AtomicUsize::new(0));

    let task = {
        let slot = Arc::clone(&slot);
        let observed_return = Arc::clone(&observed_return);
        group.create_task(
            move || {
                let me = slot.lock().unwrap().clone().expect("handle published");
                // Would deadlock forever if the self-wait check were missing.
                me.wait_for_finish(false);
                observed_return.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Priority::Normal,
        )
    };
    *slot.lock().unwrap() = Some(task.clone());

    task.submit().unwrap();
    task.wait_for_finish(false);
    assert_eq!(observed_return.load(Ordering::SeqCst), 1);
    assert!(task.has_finished());
    group.shut_down(true);
}

#[test]
fn failures_and_panics_are_captured_on_the_task() {
    let group = group("failures");

    let failing = group.create_task(
        || {
            Err(TaskError::Fail {
                reason: "no disk".into(),
            })
        },
        Priority::Normal,
    );
    failing.submit().unwrap();
    failing.wait_for_finish(false);
    assert!(failing.ended_with_errors());
    assert_eq!(failing.error().unwrap().as_label(), "task_failed");

    let panicking = group.create_task(|| panic!("boom"), Priority::Normal);
    panicking.submit().unwrap();
    panicking.wait_for_finish(false);
    assert_eq!(panicking.error().unwrap().as_label(), "task_panicked");

    // The drain survived both: a healthy task still runs afterwards.
    let healthy = group.create_producer_task(|| Ok("still alive"), Priority::Normal);
    healthy.submit().unwrap();
    assert_eq!(healthy.join(), Some("still alive"));
    group.shut_down(true);
}

#[test]
fn failed_producer_join_returns_none() {
    let group = group("failed-producer");
    let task = group.create_producer_task::<i32, _>(
        || {
            Err(TaskError::Fail {
                reason: "nothing to produce".into(),
            })
        },
        Priority::Normal,
    );
    task.submit().unwrap();
    assert_eq!(task.join(), None);
    assert!(task.ended_with_errors());
    group.shut_down(true);
}

#[test]
fn creation_tracking_captures_a_backtrace_when_enabled() {
    let group = group("tracking");
    let untracked = group.create_task(|| Ok(()), Priority::Normal);
    assert!(untracked.creator_trace().is_none());

    group.set_task_creation_tracking(true);
    let tracked = group.create_task(|| Ok(()), Priority::Normal);
    assert!(tracked.creator_trace().is_some());

    group.set_task_creation_tracking(false);
    group.shut_down(true);
}

//! Thread-supplier behavior under load: worker reuse, adaptive cap growth,
//! counter consistency and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backtask::{DetachedCount, SupplierSettings, ThreadCount, ThreadSupplier, WorkerKind};

fn settings(poolable: usize, detached: usize, step: usize, timeout_ms: u64) -> SupplierSettings {
    SupplierSettings {
        max_poolable: ThreadCount::Fixed(poolable),
        max_detached: DetachedCount::Fixed(detached),
        request_timeout: Duration::from_millis(timeout_ms),
        daemon: true,
        increasing_step: step,
        decay_threshold: Duration::from_millis(30_000),
    }
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
fn poolable_worker_is_reused_after_parking() {
    let supplier = ThreadSupplier::from_settings("reuse", settings(2, 4, 2, 500)).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    let first = supplier.get_or_create();
    let first_index = first.index();
    assert_eq!(first.kind(), WorkerKind::Poolable);
    {
        let ran = Arc::clone(&ran);
        first.set_executable(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }
    first.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || supplier.parked_count() == 1));
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    // The parked worker is handed out again instead of a fresh one.
    let second = supplier.get_or_create();
    assert_eq!(second.index(), first_index);
    assert_eq!(supplier.poolable_thread_count(), 1);
    {
        let ran = Arc::clone(&ran);
        second.set_executable(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }
    second.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        ran.load(Ordering::SeqCst) == 2 && supplier.parked_count() == 1
    }));
    supplier.shut_down_all();
}

#[test]
fn saturated_supplier_grows_cap_and_completes_all_work() {
    // maxPoolable=2, maxDetached=0, step=2, timeout=200ms: four one-second
    // jobs force a timeout and a cap increase of 2, and all four complete.
    let supplier = ThreadSupplier::from_settings("growth", settings(2, 0, 2, 200)).unwrap();
    let initial = supplier.initial_max_total();
    let done = Arc::new(AtomicUsize::new(0));

    let started = Instant::now();
    for _ in 0..4 {
        let worker = supplier.get_or_create();
        let done = Arc::clone(&done);
        worker.set_executable(move || {
            std::thread::sleep(Duration::from_secs(1));
            done.fetch_add(1, Ordering::SeqCst);
        });
        worker.start().unwrap();
    }
    let acquisition_time = started.elapsed();

    // The third request waited out the 200ms timeout before the cap grew.
    assert!(acquisition_time >= Duration::from_millis(200));
    assert!(supplier.max_total() > initial);
    assert!(wait_until(Duration::from_secs(10), || {
        done.load(Ordering::SeqCst) == 4
    }));
    supplier.shut_down_all();
}

#[test]
fn counters_stay_consistent_and_parked_workers_leave_the_running_set() {
    let supplier = ThreadSupplier::from_settings("invariants", settings(3, 2, 2, 300)).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let worker = supplier.get_or_create();
        let done = Arc::clone(&done);
        worker.set_executable(move || {
            std::thread::sleep(Duration::from_millis(100));
            done.fetch_add(1, Ordering::SeqCst);
        });
        worker.start().unwrap();
        assert!(supplier.poolable_thread_count() <= supplier.max_poolable());
        assert!(supplier.thread_count() <= supplier.max_total());
    }

    assert!(wait_until(Duration::from_secs(5), || {
        done.load(Ordering::SeqCst) == 5
    }));
    // Quiet state: three poolable workers parked, detached ones gone; the
    // running set holds at most the notifier.
    assert!(wait_until(Duration::from_secs(5), || {
        supplier.parked_count() == 3 && supplier.running_count() <= 1
    }));
    assert!(supplier.running_count() + supplier.parked_count() <= supplier.thread_count());
    supplier.log_status();
    supplier.shut_down_all();
    // Shutdown retires parked workers and the notifier.
    assert!(wait_until(Duration::from_secs(5), || supplier.thread_count() == 0));
    assert_eq!(supplier.parked_count(), 0);
}

#[test]
fn settings_resolve_from_properties() {
    let mut props = backtask::Properties::new();
    props.insert(
        backtask::keys::MAX_POOLABLE_THREAD_COUNT.to_owned(),
        "2".to_owned(),
    );
    props.insert(
        backtask::keys::MAX_DETACHED_THREAD_COUNT.to_owned(),
        "1".to_owned(),
    );
    let supplier = ThreadSupplier::create("from-props", &props).unwrap();
    assert_eq!(supplier.max_poolable(), 2);
    assert_eq!(supplier.initial_max_total(), 3);
    supplier.shut_down_all();
}

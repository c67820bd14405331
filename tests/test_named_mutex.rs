// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named mutex behaviour within one process: contention between instances,
// timeouts, release idempotence, scoped acquisition and abandonment.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use winglet::{AcquireOutcome, NamedMutex};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("winglet_{prefix}_{}_{n}", std::process::id())
}

/// Hold `name` on a helper thread until the returned sender fires.
fn hold_on_thread(name: &str) -> (mpsc::Sender<()>, thread::JoinHandle<()>) {
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let name = name.to_string();
    let h = thread::spawn(move || {
        let mtx = NamedMutex::new(&name).expect("open holder");
        assert!(mtx.acquire(true, None));
        locked_tx.send(()).unwrap();
        let _ = release_rx.recv();
        mtx.release();
    });
    locked_rx.recv().expect("holder locked");
    (release_tx, h)
}

/// One non-blocking attempt from a fresh thread and instance.
fn poll_from_thread(name: &str) -> bool {
    let name = name.to_string();
    thread::spawn(move || {
        let mtx = NamedMutex::new(&name).expect("open poller");
        let acquired = mtx.acquire(false, None);
        if acquired {
            mtx.release();
        }
        acquired
    })
    .join()
    .unwrap()
}

#[test]
fn open() {
    let name = unique_name("open");
    NamedMutex::clear_storage(&name);

    let mtx = NamedMutex::new(&name).expect("open");
    assert_eq!(mtx.name(), name);
    assert!(!mtx.is_owned());
    drop(mtx);

    NamedMutex::clear_storage(&name);
}

#[test]
fn invalid_names_fail_creation() {
    let err = NamedMutex::new("").unwrap_err();
    assert_eq!(err.code, None);
    assert!(NamedMutex::new("bad\0name").is_err());
    #[cfg(unix)]
    assert!(NamedMutex::new("has/slash").is_err());
}

// Same thread, two instances. POSIX mutexes here are error-checking, so the
// second instance sees the lock as busy; Windows mutexes are recursive.
#[cfg(unix)]
#[test]
fn second_instance_sees_lock_held() {
    let name = unique_name("two_instances");
    NamedMutex::clear_storage(&name);

    let a = NamedMutex::new(&name).expect("open a");
    let b = NamedMutex::new(&name).expect("open b");

    assert!(a.acquire(true, None));
    assert!(!b.acquire(false, None));
    assert!(!b.is_owned());
    a.release();
    assert!(b.acquire(false, None));
    b.release();

    drop(a);
    drop(b);
    NamedMutex::clear_storage(&name);
}

// Timed form of the above: the wait runs out and reports a plain timeout.
#[cfg(unix)]
#[test]
fn second_instance_timed_acquire_times_out() {
    let name = unique_name("two_instances_timed");
    NamedMutex::clear_storage(&name);

    let a = NamedMutex::new(&name).expect("open a");
    let b = NamedMutex::new(&name).expect("open b");
    assert!(a.acquire(true, None));

    let start = Instant::now();
    let outcome = b.acquire_outcome(true, Some(Duration::from_millis(200)));
    let elapsed = start.elapsed();

    assert_eq!(outcome, AcquireOutcome::TimedOut);
    assert!(elapsed >= Duration::from_millis(150), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "overshot: {elapsed:?}");
    assert!(!b.is_owned());

    a.release();
    assert!(b.acquire(true, Some(Duration::from_millis(200))));
    b.release();

    drop(a);
    drop(b);
    NamedMutex::clear_storage(&name);
}

// Instance A takes "alpha", B polls and fails, A releases, B polls and wins.
#[test]
fn alpha_scenario_across_threads() {
    let name = unique_name("alpha");
    NamedMutex::clear_storage(&name);

    let (release, holder) = hold_on_thread(&name);

    let b = NamedMutex::new(&name).expect("open b");
    assert!(!b.acquire(false, None));

    release.send(()).unwrap();
    holder.join().unwrap();

    assert!(b.acquire(false, None));
    b.release();

    drop(b);
    NamedMutex::clear_storage(&name);
}

#[test]
fn acquire_release_acquire_same_instance() {
    let name = unique_name("round_trip");
    NamedMutex::clear_storage(&name);

    let mtx = NamedMutex::new(&name).expect("open");
    assert!(mtx.acquire(true, None));
    mtx.release();
    assert!(mtx.acquire(true, None));
    mtx.release();

    for i in 0..100 {
        assert!(mtx.acquire(true, None), "cycle {i}");
        mtx.release();
    }

    drop(mtx);
    NamedMutex::clear_storage(&name);
}

#[test]
fn double_release_is_harmless() {
    let name = unique_name("double_release");
    NamedMutex::clear_storage(&name);

    let mtx = NamedMutex::new(&name).expect("open");
    mtx.release();

    assert!(mtx.acquire(true, None));
    mtx.release();
    mtx.release();
    assert!(!mtx.is_owned());

    // Still usable afterwards.
    assert!(mtx.acquire(false, None));
    mtx.release();

    drop(mtx);
    NamedMutex::clear_storage(&name);
}

#[test]
fn timed_acquire_gives_up_after_timeout() {
    let name = unique_name("timeout");
    NamedMutex::clear_storage(&name);

    let (release, holder) = hold_on_thread(&name);

    let mtx = NamedMutex::new(&name).expect("open");
    let timeout = Duration::from_millis(200);
    let start = Instant::now();
    let outcome = mtx.acquire_outcome(true, Some(timeout));
    let elapsed = start.elapsed();

    assert_eq!(outcome, AcquireOutcome::TimedOut);
    assert!(elapsed >= Duration::from_millis(150), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "overshot: {elapsed:?}");

    release.send(()).unwrap();
    holder.join().unwrap();
    drop(mtx);
    NamedMutex::clear_storage(&name);
}

#[test]
fn timed_acquire_succeeds_when_released_in_time() {
    let name = unique_name("timeout_ok");
    NamedMutex::clear_storage(&name);

    let (release, holder) = hold_on_thread(&name);

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        release.send(()).unwrap();
    });

    let mtx = NamedMutex::new(&name).expect("open");
    assert!(mtx.acquire(true, Some(Duration::from_secs(5))));
    mtx.release();

    releaser.join().unwrap();
    holder.join().unwrap();
    drop(mtx);
    NamedMutex::clear_storage(&name);
}

#[test]
fn non_blocking_ignores_timeout() {
    let name = unique_name("poll_timeout");
    NamedMutex::clear_storage(&name);

    let (release, holder) = hold_on_thread(&name);

    let mtx = NamedMutex::new(&name).expect("open");
    let start = Instant::now();
    let with_timeout = mtx.acquire_outcome(false, Some(Duration::from_secs(3)));
    let elapsed = start.elapsed();
    let without = mtx.acquire_outcome(false, None);

    assert_eq!(with_timeout, AcquireOutcome::TimedOut);
    assert_eq!(with_timeout, without);
    assert!(elapsed < Duration::from_secs(1), "non-blocking acquire waited {elapsed:?}");

    release.send(()).unwrap();
    holder.join().unwrap();

    // Uncontended: both forms succeed immediately.
    assert!(mtx.acquire(false, Some(Duration::from_secs(3))));
    mtx.release();

    drop(mtx);
    NamedMutex::clear_storage(&name);
}

#[test]
fn drop_releases_held_lock() {
    let name = unique_name("drop_release");
    NamedMutex::clear_storage(&name);

    let other = NamedMutex::new(&name).expect("open other");
    {
        let mtx = NamedMutex::new(&name).expect("open");
        assert!(mtx.acquire(true, None));
    }
    assert!(other.acquire(false, None));
    other.release();

    drop(other);
    NamedMutex::clear_storage(&name);
}

#[test]
fn scoped_lock_releases_on_exit() {
    let name = unique_name("guard");
    NamedMutex::clear_storage(&name);

    let mtx = NamedMutex::new(&name).expect("open");
    {
        let guard = mtx.lock();
        assert!(guard.acquired());
        assert_eq!(guard.outcome(), &AcquireOutcome::Acquired);
        assert!(guard.mutex().is_owned());
        assert!(!poll_from_thread(&name));
    }
    assert!(!mtx.is_owned());
    assert!(poll_from_thread(&name));

    drop(mtx);
    NamedMutex::clear_storage(&name);
}

#[test]
fn with_lock_releases_on_panic() {
    let name = unique_name("with_lock_panic");
    NamedMutex::clear_storage(&name);

    let mtx = NamedMutex::new(&name).expect("open");
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        mtx.with_lock(|acquired| {
            assert!(acquired);
            panic!("inside the lock");
        })
    }));
    assert!(result.is_err());
    assert!(!mtx.is_owned());

    let other = NamedMutex::new(&name).expect("open other");
    assert!(other.acquire(false, None));
    other.release();

    drop(other);
    drop(mtx);
    NamedMutex::clear_storage(&name);
}

#[test]
fn with_lock_passes_errors_through() {
    let name = unique_name("with_lock_err");
    NamedMutex::clear_storage(&name);

    let mtx = NamedMutex::new(&name).expect("open");
    let result: Result<(), String> = mtx.with_lock(|acquired| {
        assert!(acquired);
        Err("boom".to_string())
    });
    assert_eq!(result, Err("boom".to_string()));
    assert!(!mtx.is_owned());

    drop(mtx);
    NamedMutex::clear_storage(&name);
}

#[test]
fn release_from_other_thread_is_refused() {
    let name = unique_name("foreign_release");
    NamedMutex::clear_storage(&name);

    let mtx = NamedMutex::new(&name).expect("open");
    assert!(mtx.acquire(true, None));

    thread::scope(|s| {
        s.spawn(|| mtx.release());
    });
    // The OS still counts the acquiring thread as owner.
    assert!(mtx.is_owned());

    mtx.release();
    assert!(!mtx.is_owned());

    drop(mtx);
    NamedMutex::clear_storage(&name);
}

#[test]
fn critical_section() {
    let name = unique_name("critical_section");
    NamedMutex::clear_storage(&name);

    let counter = Arc::new(AtomicI32::new(0));
    let inside = Arc::new(AtomicBool::new(false));
    let violation = Arc::new(AtomicBool::new(false));
    let iterations = 100;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let name = name.clone();
            let counter = Arc::clone(&counter);
            let inside = Arc::clone(&inside);
            let violation = Arc::clone(&violation);
            thread::spawn(move || {
                let mtx = NamedMutex::new(&name).expect("open");
                for _ in 0..iterations {
                    let guard = mtx.lock();
                    assert!(guard.acquired());
                    if inside.swap(true, Ordering::SeqCst) {
                        violation.store(true, Ordering::SeqCst);
                    }
                    counter.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(Duration::from_micros(10));
                    inside.store(false, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert!(!violation.load(Ordering::SeqCst), "two threads in the critical section");
    assert_eq!(counter.load(Ordering::Relaxed), iterations * 4);
    NamedMutex::clear_storage(&name);
}

// macOS has no robust pthread mutexes, so a dead holder is not detected.
#[cfg(not(target_os = "macos"))]
#[test]
fn dead_holder_thread_is_reported_as_abandoned() {
    let name = unique_name("abandoned");
    NamedMutex::clear_storage(&name);

    let mtx = NamedMutex::new(&name).expect("open");

    let (locked_tx, locked_rx) = mpsc::channel();
    let (exit_tx, exit_rx) = mpsc::channel::<()>();
    let name_t = name.clone();
    let holder = thread::spawn(move || {
        // No auto cleanup: dropping skips the release.
        let leaked = NamedMutex::with_auto_cleanup(&name_t, false).expect("open holder");
        assert!(leaked.acquire(true, None));
        drop(leaked);
        locked_tx.send(()).unwrap();
        let _ = exit_rx.recv();
    });
    locked_rx.recv().unwrap();

    // Holder thread alive: plainly busy.
    assert_eq!(mtx.acquire_outcome(false, None), AcquireOutcome::TimedOut);

    exit_tx.send(()).unwrap();
    holder.join().unwrap();

    let outcome = mtx.acquire_outcome(false, None);
    assert_eq!(outcome, AcquireOutcome::Abandoned);
    assert!(outcome.is_acquired());
    assert!(mtx.is_owned());
    mtx.release();

    // Recovered: the next acquisition is clean.
    assert_eq!(mtx.acquire_outcome(false, None), AcquireOutcome::Acquired);
    mtx.release();

    drop(mtx);
    NamedMutex::clear_storage(&name);
}

//! Concurrency behavior of document and collection locks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use arbordb::{AcquireFailure, Error, LockManager, LockType};

const DOC: &str = "/db/test/test1.xml";

fn worker_count() -> usize {
    let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    cpus * 3
}

#[test]
fn many_readers_hold_a_document_at_once() {
    let locks = Arc::new(LockManager::new());
    let n = worker_count();
    let all_holding = Arc::new(Barrier::new(n));

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let locks = Arc::clone(&locks);
            let all_holding = Arc::clone(&all_holding);
            thread::spawn(move || {
                let lock = locks.acquire_document_read(DOC).expect("should acquire read");
                // Deadlocks unless every reader holds the lock simultaneously.
                all_holding.wait();
                lock.release().expect("should release");
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("reader should not panic");
    }

    let counters = locks.stats().counters();
    assert_eq!(counters.read_acquired, n as u64);
    assert_eq!(counters.outstanding(), 0);
    assert_eq!(locks.active_entries(), 0);
}

#[test]
fn second_writer_waits_for_the_first() {
    let locks = Arc::new(LockManager::new());
    let first = locks.acquire_document_write(DOC).expect("should acquire write");

    let inside = Arc::new(AtomicUsize::new(1));
    let second_acquired = Arc::new(AtomicBool::new(false));

    let handle = {
        let locks = Arc::clone(&locks);
        let inside = Arc::clone(&inside);
        let second_acquired = Arc::clone(&second_acquired);
        thread::spawn(move || {
            let lock = locks.acquire_document_write(DOC).expect("should acquire write");
            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two writers inside");
            second_acquired.store(true, Ordering::SeqCst);
            inside.fetch_sub(1, Ordering::SeqCst);
            lock.release().expect("should release");
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while !locks.has_queued_threads(LockType::Document, DOC) {
        assert!(Instant::now() < deadline, "second writer never queued");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(!second_acquired.load(Ordering::SeqCst));

    inside.fetch_sub(1, Ordering::SeqCst);
    first.release().expect("should release");
    handle.join().expect("writer should not panic");

    assert!(second_acquired.load(Ordering::SeqCst));
    assert!(!locks.has_queued_threads(LockType::Document, DOC));
}

#[test]
fn writer_excludes_readers_until_released() {
    let locks = LockManager::new();
    let writer = locks.acquire_document_write(DOC).expect("should acquire write");

    let try_read = || {
        thread::scope(|s| {
            s.spawn(|| {
                locks
                    .try_acquire_document_read(DOC)
                    .expect("try should not fail")
                    .is_some()
            })
            .join()
            .expect("reader should not panic")
        })
    };

    assert!(!try_read());
    writer.release().expect("should release");
    assert!(try_read());
}

#[test]
fn interrupt_wakes_blocked_writer() {
    let locks = Arc::new(LockManager::new());
    let held = locks.acquire_document_read(DOC).expect("should acquire read");

    let handle = {
        let locks = Arc::clone(&locks);
        thread::spawn(move || locks.acquire_document_write(DOC).map(|_| ()))
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while !locks.has_queued_threads(LockType::Document, DOC) {
        assert!(Instant::now() < deadline, "writer never queued");
        thread::sleep(Duration::from_millis(1));
    }
    locks.interrupt_waiters();

    let result = handle.join().expect("writer should not panic");
    assert!(matches!(
        result,
        Err(Error::LockAcquisition {
            reason: AcquireFailure::Interrupted,
            ..
        })
    ));

    held.release().expect("should release");
    locks
        .acquire_document_write(DOC)
        .expect("acquisition after interrupt should succeed");
}

#[test]
fn timed_wait_gives_up() {
    let locks = LockManager::new();
    let _held = locks.acquire_collection_write("/db/test").expect("should acquire write");

    thread::scope(|s| {
        let result = s
            .spawn(|| {
                locks
                    .acquire_collection_read_timeout("/db/test", Duration::from_millis(20))
                    .map(|_| ())
            })
            .join()
            .expect("waiter should not panic");

        assert!(matches!(
            result,
            Err(Error::LockAcquisition {
                reason: AcquireFailure::TimedOut,
                ..
            })
        ));
    });
}

#[test]
fn collection_then_document_in_order() {
    let locks = LockManager::new();
    let group = locks
        .acquire_document_write_in_collection("/db/test/test1.xml")
        .expect("should acquire both");
    assert_eq!(group.len(), 2);

    let snapshot = locks.snapshot();
    assert!(snapshot.find(LockType::Collection, "/db/test").is_some());
    assert!(snapshot.find(LockType::Document, DOC).is_some());

    group.release().expect("should release");
    assert!(locks.snapshot().is_empty());
}

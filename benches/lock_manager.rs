//! Lock manager benchmarks for arbordb
//!
//! Uncontended acquire/release is on every document operation's path, so it
//! is measured per lock type and mode. The contended group runs readers on
//! one hot document from several threads.

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use arbordb::{LockManager, LockMode, LockType};

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_uncontended");
    let locks = LockManager::new();

    let cases = [
        (LockType::Collection, LockMode::Read, "collection_read"),
        (LockType::Collection, LockMode::Write, "collection_write"),
        (LockType::Document, LockMode::Read, "document_read"),
        (LockType::Document, LockMode::Write, "document_write"),
    ];

    for (lock_type, mode, name) in cases {
        group.bench_function(BenchmarkId::new("acquire_release", name), |b| {
            b.iter(|| {
                let lock = locks
                    .acquire(lock_type, black_box("/db/bench/doc.xml"), mode)
                    .expect("uncontended acquire");
                lock.release().expect("release");
            });
        });
    }

    group.finish();
}

fn bench_reentrant(c: &mut Criterion) {
    let locks = LockManager::new();
    let _outer = locks
        .acquire_document_write("/db/bench/reentrant.xml")
        .expect("outer lock");

    c.bench_function("lock_reentrant_write", |b| {
        b.iter(|| {
            let inner = locks
                .acquire_document_write(black_box("/db/bench/reentrant.xml"))
                .expect("reentrant acquire");
            inner.release().expect("release");
        });
    });
}

fn bench_contended_readers(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_contended_readers");
    group.sample_size(20);

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let locks = Arc::new(LockManager::new());
            b.iter(|| {
                thread::scope(|s| {
                    for _ in 0..threads {
                        s.spawn(|| {
                            for _ in 0..256 {
                                let lock = locks
                                    .acquire_document_read("/db/bench/hot.xml")
                                    .expect("read");
                                lock.release().expect("release");
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_reentrant, bench_contended_readers);
criterion_main!(benches);

//! # Sync Scheduler
//!
//! Runs a `SyncCoordinator` on a dedicated OS thread every `sync-period`.
//! The thread sleeps on a condition variable so `shutdown` wakes it at once
//! instead of waiting out the period.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use parking_lot::{Condvar, Mutex};

use super::SyncCoordinator;
use crate::database::Database;

const TASK: &str = "sync";

struct Shared {
    stop: Mutex<bool>,
    wake: Condvar,
    ticks: AtomicU64,
    failures: AtomicU64,
}

pub struct SyncScheduler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    pub fn start(
        db: Arc<Database>,
        coordinator: SyncCoordinator,
        period: Duration,
    ) -> eyre::Result<Self> {
        let shared = Arc::new(Shared {
            stop: Mutex::new(false),
            wake: Condvar::new(),
            ticks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("arbordb-sync".to_string())
            .spawn(move || run(&worker, &db, &coordinator, period))
            .wrap_err("failed to spawn sync thread")?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Completed ticks, successful or not.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the thread and waits for the tick in progress, if any.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        *self.shared.stop.lock() = true;
        self.shared.wake.notify_all();
        if handle.join().is_err() {
            tracing::error!(task = TASK, "sync thread panicked");
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: &Shared, db: &Database, coordinator: &SyncCoordinator, period: Duration) {
    tracing::info!(task = TASK, period_ms = period.as_millis() as u64, "Task starting");

    loop {
        let deadline = Instant::now() + period;
        {
            let mut stop = shared.stop.lock();
            while !*stop {
                if shared.wake.wait_until(&mut stop, deadline).timed_out() {
                    break;
                }
            }
            if *stop {
                break;
            }
        }

        match coordinator.execute(db) {
            Ok(outcome) => {
                tracing::trace!(task = TASK, kind = ?outcome.kind(), "Task executed");
            }
            Err(e) => {
                shared.failures.fetch_add(1, Ordering::AcqRel);
                tracing::error!(task = TASK, error = %e, "Task execution failed");
            }
        }
        shared.ticks.fetch_add(1, Ordering::AcqRel);
    }

    tracing::info!(task = TASK, "Task shutting down");
}

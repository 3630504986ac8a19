//! # Fair Re-entrant Reader/Writer Lock
//!
//! One `ResourceLock` guards one resource path. It is a monitor
//! (`parking_lot::Mutex` + `Condvar`) over explicit holder and queue state.
//!
//! ## State
//!
//! ```text
//! writer:  Option<(ThreadId, holds)>
//! readers: [(ThreadId, holds), ...]      a writer may also appear here
//! queue:   [ticket 7: W, ticket 8: R, ticket 9: R]   arrival order
//! ```
//!
//! ## Grant Rules
//!
//! Re-entrant requests never queue:
//!
//! - a thread that holds the write lock may take read or write again
//! - a thread that holds a read lock may take read again
//! - a thread that is the *only* reader may upgrade to write; any other
//!   upgrade fails with `UpgradeConflict` instead of deadlocking
//!
//! New requests join the queue and are granted in arrival order:
//!
//! - a reader proceeds when nobody writes and no writer is queued ahead of it,
//!   so consecutive queued readers are admitted together
//! - a writer proceeds when it is at the head of the queue and the lock is free
//!
//! ## Interruption
//!
//! Waiters capture an interrupt epoch when they start waiting. The manager
//! bumps the epoch and notifies every lock; a waiter that sees a newer epoch
//! leaves the queue and reports `Interrupted`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use super::LockMode;
use crate::error::AcquireFailure;

#[derive(Debug, Clone, Copy)]
struct Waiter {
    ticket: u64,
    mode: LockMode,
}

#[derive(Debug, Default)]
struct LockState {
    writer: Option<(ThreadId, u32)>,
    readers: SmallVec<[(ThreadId, u32); 4]>,
    queue: VecDeque<Waiter>,
    next_ticket: u64,
}

impl LockState {
    fn read_holds_mut(&mut self, thread: ThreadId) -> Option<&mut u32> {
        self.readers
            .iter_mut()
            .find(|(owner, _)| *owner == thread)
            .map(|(_, holds)| holds)
    }

    fn is_reader(&self, thread: ThreadId) -> bool {
        self.readers.iter().any(|(owner, _)| *owner == thread)
    }

    fn is_writer(&self, thread: ThreadId) -> bool {
        matches!(self.writer, Some((owner, _)) if owner == thread)
    }

    fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }

    fn add_read(&mut self, thread: ThreadId) {
        match self.read_holds_mut(thread) {
            Some(holds) => *holds += 1,
            None => self.readers.push((thread, 1)),
        }
    }

    /// Grants a re-entrant request without queueing, if this is one.
    fn try_reenter(
        &mut self,
        thread: ThreadId,
        mode: LockMode,
    ) -> Option<Result<(), AcquireFailure>> {
        match mode {
            LockMode::Read => {
                if self.is_writer(thread) || self.is_reader(thread) {
                    self.add_read(thread);
                    return Some(Ok(()));
                }
                None
            }
            LockMode::Write => {
                if let Some((owner, holds)) = self.writer.as_mut() {
                    if *owner == thread {
                        *holds += 1;
                        return Some(Ok(()));
                    }
                }
                if self.is_reader(thread) {
                    if self.writer.is_none() && self.readers.len() == 1 {
                        self.writer = Some((thread, 1));
                        return Some(Ok(()));
                    }
                    return Some(Err(AcquireFailure::UpgradeConflict));
                }
                None
            }
        }
    }

    fn writer_queued_before(&self, ticket: u64) -> bool {
        self.queue
            .iter()
            .take_while(|w| w.ticket != ticket)
            .any(|w| w.mode == LockMode::Write)
    }

    fn grantable(&self, ticket: u64, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => self.writer.is_none() && !self.writer_queued_before(ticket),
            LockMode::Write => {
                self.is_free() && self.queue.front().map(|w| w.ticket) == Some(ticket)
            }
        }
    }

    fn grant(&mut self, thread: ThreadId, mode: LockMode) {
        match mode {
            LockMode::Read => self.add_read(thread),
            LockMode::Write => self.writer = Some((thread, 1)),
        }
    }

    fn leave_queue(&mut self, ticket: u64) {
        if let Some(at) = self.queue.iter().position(|w| w.ticket == ticket) {
            self.queue.remove(at);
        }
    }
}

/// Point-in-time view of a lock, for snapshots and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockView {
    pub writer: Option<ThreadId>,
    pub write_holds: u32,
    pub readers: Vec<(ThreadId, u32)>,
    pub queued_readers: usize,
    pub queued_writers: usize,
}

impl LockView {
    pub fn is_held(&self) -> bool {
        self.writer.is_some() || !self.readers.is_empty()
    }
}

/// How an acquisition was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granted {
    Immediately,
    AfterWaiting,
}

#[derive(Debug, Default)]
pub struct ResourceLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl ResourceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `mode` is granted to `thread`, `deadline` passes, or the
    /// interrupt epoch moves past the value observed on entry.
    pub fn acquire(
        &self,
        thread: ThreadId,
        mode: LockMode,
        deadline: Option<Instant>,
        interrupts: &AtomicU64,
    ) -> Result<Granted, AcquireFailure> {
        let epoch = interrupts.load(Ordering::Acquire);
        let mut state = self.state.lock();

        if let Some(result) = state.try_reenter(thread, mode) {
            return result.map(|_| Granted::Immediately);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(Waiter { ticket, mode });

        let mut waited = false;
        loop {
            if state.grantable(ticket, mode) {
                state.leave_queue(ticket);
                state.grant(thread, mode);
                if mode == LockMode::Read {
                    // readers queued right behind us may now be grantable
                    self.cond.notify_all();
                }
                return Ok(if waited {
                    Granted::AfterWaiting
                } else {
                    Granted::Immediately
                });
            }

            if interrupts.load(Ordering::Acquire) != epoch {
                state.leave_queue(ticket);
                self.cond.notify_all();
                return Err(AcquireFailure::Interrupted);
            }

            waited = true;
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out()
                        && !state.grantable(ticket, mode)
                    {
                        state.leave_queue(ticket);
                        self.cond.notify_all();
                        return Err(AcquireFailure::TimedOut);
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
    }

    /// Grants `mode` only if that is possible without waiting behind anyone.
    pub fn try_acquire(&self, thread: ThreadId, mode: LockMode) -> Result<bool, AcquireFailure> {
        let mut state = self.state.lock();

        if let Some(result) = state.try_reenter(thread, mode) {
            return result.map(|_| true);
        }

        let compatible = match mode {
            LockMode::Read => {
                state.writer.is_none() && !state.queue.iter().any(|w| w.mode == LockMode::Write)
            }
            LockMode::Write => state.is_free() && state.queue.is_empty(),
        };
        if compatible {
            state.grant(thread, mode);
        }
        Ok(compatible)
    }

    /// Releases one hold of `mode` by `thread`. The error describes a release
    /// of a lock the thread does not hold.
    pub fn release(&self, thread: ThreadId, mode: LockMode) -> Result<(), String> {
        let mut state = self.state.lock();

        let freed = match mode {
            LockMode::Read => {
                let at = state
                    .readers
                    .iter()
                    .position(|(owner, _)| *owner == thread)
                    .ok_or_else(|| format!("{:?} does not hold a read lock", thread))?;
                state.readers[at].1 -= 1;
                if state.readers[at].1 == 0 {
                    state.readers.remove(at);
                    true
                } else {
                    false
                }
            }
            LockMode::Write => match state.writer {
                Some((owner, holds)) if owner == thread => {
                    if holds > 1 {
                        state.writer = Some((owner, holds - 1));
                        false
                    } else {
                        state.writer = None;
                        true
                    }
                }
                Some((owner, _)) => {
                    return Err(format!(
                        "{:?} released a write lock held by {:?}",
                        thread, owner
                    ))
                }
                None => return Err(format!("{:?} does not hold the write lock", thread)),
            },
        };

        if freed && !state.queue.is_empty() {
            self.cond.notify_all();
        }
        Ok(())
    }

    /// Wakes every waiter so it can observe an interrupt.
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    pub fn has_queued_threads(&self) -> bool {
        !self.state.lock().queue.is_empty()
    }

    /// Unheld and nobody waiting.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.is_free() && state.queue.is_empty()
    }

    pub fn view(&self) -> LockView {
        let state = self.state.lock();
        let (writer, write_holds) = match state.writer {
            Some((owner, holds)) => (Some(owner), holds),
            None => (None, 0),
        };
        let queued_writers = state
            .queue
            .iter()
            .filter(|w| w.mode == LockMode::Write)
            .count();

        LockView {
            writer,
            write_holds,
            readers: state.readers.to_vec(),
            queued_readers: state.queue.len() - queued_writers,
            queued_writers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn me() -> ThreadId {
        thread::current().id()
    }

    fn wait_until_queued(lock: &ResourceLock) {
        while !lock.has_queued_threads() {
            thread::yield_now();
        }
    }

    #[test]
    fn readers_share_the_lock() {
        let lock = Arc::new(ResourceLock::new());
        let epoch = AtomicU64::new(0);
        lock.acquire(me(), LockMode::Read, None, &epoch).expect("should read");

        let other = Arc::clone(&lock);
        let granted = thread::spawn(move || {
            let epoch = AtomicU64::new(0);
            let id = thread::current().id();
            let granted = other.acquire(id, LockMode::Read, None, &epoch);
            other.release(id, LockMode::Read).expect("should release");
            granted
        })
        .join()
        .expect("thread should finish");

        assert_eq!(granted, Ok(Granted::Immediately));
        lock.release(me(), LockMode::Read).expect("should release");
        assert!(lock.is_idle());
    }

    #[test]
    fn writer_reenters_for_read_and_write() {
        let lock = ResourceLock::new();
        let epoch = AtomicU64::new(0);

        lock.acquire(me(), LockMode::Write, None, &epoch).expect("should write");
        lock.acquire(me(), LockMode::Write, None, &epoch).expect("should re-enter write");
        lock.acquire(me(), LockMode::Read, None, &epoch).expect("should nest read");

        let view = lock.view();
        assert_eq!(view.write_holds, 2);
        assert_eq!(view.readers, vec![(me(), 1)]);

        lock.release(me(), LockMode::Read).expect("should release read");
        lock.release(me(), LockMode::Write).expect("should release write");
        assert!(!lock.is_idle());
        lock.release(me(), LockMode::Write).expect("should release write");
        assert!(lock.is_idle());
    }

    #[test]
    fn sole_reader_may_upgrade() {
        let lock = ResourceLock::new();
        let epoch = AtomicU64::new(0);

        lock.acquire(me(), LockMode::Read, None, &epoch).expect("should read");
        assert_eq!(
            lock.acquire(me(), LockMode::Write, None, &epoch),
            Ok(Granted::Immediately)
        );
        assert_eq!(lock.view().writer, Some(me()));
    }

    #[test]
    fn shared_reader_cannot_upgrade() {
        let lock = Arc::new(ResourceLock::new());
        let epoch = AtomicU64::new(0);
        lock.acquire(me(), LockMode::Read, None, &epoch).expect("should read");

        let other = Arc::clone(&lock);
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let id = thread::current().id();
            let epoch = AtomicU64::new(0);
            other.acquire(id, LockMode::Read, None, &epoch).expect("should read");
            tx.send(()).expect("should signal");
            done_rx.recv().expect("should wait for test");
            other.release(id, LockMode::Read).expect("should release");
        });
        rx.recv().expect("other reader should be in");

        assert_eq!(
            lock.acquire(me(), LockMode::Write, None, &epoch),
            Err(AcquireFailure::UpgradeConflict)
        );

        done_tx.send(()).expect("should signal");
        handle.join().expect("thread should finish");
    }

    #[test]
    fn queued_writer_blocks_new_readers() {
        let lock = Arc::new(ResourceLock::new());
        let epoch = AtomicU64::new(0);
        lock.acquire(me(), LockMode::Read, None, &epoch).expect("should read");

        let writer_lock = Arc::clone(&lock);
        let writer = thread::spawn(move || {
            let id = thread::current().id();
            let epoch = AtomicU64::new(0);
            let granted = writer_lock.acquire(id, LockMode::Write, None, &epoch);
            writer_lock.release(id, LockMode::Write).expect("should release");
            granted
        });
        wait_until_queued(&lock);

        let reader_lock = Arc::clone(&lock);
        let late_reader = thread::spawn(move || {
            reader_lock
                .try_acquire(thread::current().id(), LockMode::Read)
                .expect("should not fail")
        });
        assert!(!late_reader.join().expect("thread should finish"));

        lock.release(me(), LockMode::Read).expect("should release");
        assert_eq!(writer.join().expect("thread should finish"), Ok(Granted::AfterWaiting));
        assert!(lock.is_idle());
    }

    #[test]
    fn interrupt_epoch_wakes_waiter() {
        let lock = Arc::new(ResourceLock::new());
        let epoch = Arc::new(AtomicU64::new(0));
        lock.acquire(me(), LockMode::Write, None, &epoch).expect("should write");

        let waiter_lock = Arc::clone(&lock);
        let waiter_epoch = Arc::clone(&epoch);
        let waiter = thread::spawn(move || {
            waiter_lock.acquire(thread::current().id(), LockMode::Read, None, &waiter_epoch)
        });
        wait_until_queued(&lock);

        epoch.fetch_add(1, Ordering::AcqRel);
        lock.wake_all();

        assert_eq!(
            waiter.join().expect("thread should finish"),
            Err(AcquireFailure::Interrupted)
        );
        assert!(!lock.has_queued_threads());
    }

    #[test]
    fn deadline_expires_while_held() {
        let lock = Arc::new(ResourceLock::new());
        let epoch = AtomicU64::new(0);
        lock.acquire(me(), LockMode::Write, None, &epoch).expect("should write");

        let other = Arc::clone(&lock);
        let result = thread::spawn(move || {
            let epoch = AtomicU64::new(0);
            let deadline = Instant::now() + Duration::from_millis(20);
            other.acquire(thread::current().id(), LockMode::Write, Some(deadline), &epoch)
        })
        .join()
        .expect("thread should finish");

        assert_eq!(result, Err(AcquireFailure::TimedOut));
        assert!(!lock.has_queued_threads());
    }

    #[test]
    fn releasing_an_unheld_lock_is_reported() {
        let lock = ResourceLock::new();
        assert!(lock.release(me(), LockMode::Read).is_err());
        assert!(lock.release(me(), LockMode::Write).is_err());
    }
}

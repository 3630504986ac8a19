//! # Lock Statistics and Lock Table Snapshots
//!
//! `LockStats` counts lock traffic with relaxed atomics; it is cheap enough to
//! leave on permanently. `LockTableSnapshot` is the diagnostic view of every
//! lock currently held or waited on, meant for logs and admin tooling:
//!
//! ```text
//! collection /db/books      read x2 (2 threads)   queued r0 w1
//! document   /db/books/a    write x1 (ThreadId(7)) queued r0 w0
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use super::{LockMode, LockType, ResourcePath};

#[derive(Debug, Default)]
pub struct LockStats {
    read_acquired: AtomicU64,
    write_acquired: AtomicU64,
    contended: AtomicU64,
    try_failed: AtomicU64,
    timed_out: AtomicU64,
    interrupted: AtomicU64,
    released: AtomicU64,
    violations: AtomicU64,
}

impl LockStats {
    pub fn record_acquired(&self, mode: LockMode, contended: bool) {
        match mode {
            LockMode::Read => self.read_acquired.fetch_add(1, Ordering::Relaxed),
            LockMode::Write => self.write_acquired.fetch_add(1, Ordering::Relaxed),
        };
        if contended {
            self.contended.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_try_failed(&self) {
        self.try_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interrupted(&self) {
        self.interrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> LockCounters {
        LockCounters {
            read_acquired: self.read_acquired.load(Ordering::Relaxed),
            write_acquired: self.write_acquired.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            try_failed: self.try_failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockCounters {
    pub read_acquired: u64,
    pub write_acquired: u64,
    pub contended: u64,
    pub try_failed: u64,
    pub timed_out: u64,
    pub interrupted: u64,
    pub released: u64,
    pub violations: u64,
}

impl LockCounters {
    pub fn acquired(&self) -> u64 {
        self.read_acquired + self.write_acquired
    }

    /// Handles acquired but not yet released.
    pub fn outstanding(&self) -> u64 {
        self.acquired().saturating_sub(self.released)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTableEntry {
    pub lock_type: LockType,
    pub path: ResourcePath,
    pub writer: Option<ThreadId>,
    pub write_holds: u32,
    pub readers: Vec<(ThreadId, u32)>,
    pub queued_readers: usize,
    pub queued_writers: usize,
}

impl fmt::Display for LockTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10} {:<40}", self.lock_type.to_string(), self.path.as_str())?;
        if let Some(writer) = self.writer {
            write!(f, " write x{} ({:?})", self.write_holds, writer)?;
        }
        if !self.readers.is_empty() {
            let holds: u32 = self.readers.iter().map(|(_, n)| n).sum();
            write!(f, " read x{} ({} threads)", holds, self.readers.len())?;
        }
        write!(
            f,
            " queued r{} w{}",
            self.queued_readers, self.queued_writers
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockTableSnapshot {
    pub entries: Vec<LockTableEntry>,
}

impl LockTableSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, lock_type: LockType, path: &str) -> Option<&LockTableEntry> {
        self.entries
            .iter()
            .find(|e| e.lock_type == lock_type && e.path.as_str() == path)
    }
}

impl fmt::Display for LockTableSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "no locks held");
        }
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_outstanding_handles() {
        let stats = LockStats::default();
        stats.record_acquired(LockMode::Read, false);
        stats.record_acquired(LockMode::Write, true);
        stats.record_released();

        let counters = stats.counters();
        assert_eq!(counters.acquired(), 2);
        assert_eq!(counters.contended, 1);
        assert_eq!(counters.outstanding(), 1);
    }

    #[test]
    fn snapshot_display_lists_holders() {
        let me = std::thread::current().id();
        let snapshot = LockTableSnapshot {
            entries: vec![LockTableEntry {
                lock_type: LockType::Document,
                path: ResourcePath::parse("/db/a.xml").expect("should parse"),
                writer: None,
                write_holds: 0,
                readers: vec![(me, 2)],
                queued_readers: 0,
                queued_writers: 1,
            }],
        };

        let text = snapshot.to_string();
        assert!(text.contains("document"));
        assert!(text.contains("/db/a.xml"));
        assert!(text.contains("read x2 (1 threads)"));
        assert!(text.contains("queued r0 w1"));
        assert!(snapshot.find(LockType::Document, "/db/a.xml").is_some());
        assert_eq!(LockTableSnapshot::default().to_string(), "no locks held\n");
    }
}

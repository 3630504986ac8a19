//! # Journal Recovery
//!
//! Runs once in `Database::open`, before anything else touches the journal.
//!
//! ```text
//!   last entry on disk
//!       │
//!       ├── none ─────────────────────► fresh journal, nothing to do
//!       ├── checkpoint ───────────────► clean shutdown, nothing to replay;
//!       │                                segments before it are deleted
//!       └── anything else / torn ─────┐
//!                                     ▼
//!              find the last checkpoint (or the start of the log)
//!                                     │
//!                                     ▼
//!              replay every later entry through the redo visitor
//!                                     │
//!                                     ▼
//!              write a fresh checkpoint and switch segments,
//!              deleting the segments that were just replayed
//! ```
//!
//! A torn final entry in the newest segment is the normal residue of a crash
//! during append and ends the log. Damage anywhere else fails recovery: the
//! database must not open on a journal it cannot trust.

use crate::error::JournalError;
use crate::storage::{Journal, JournalRecord, JournalResult, Lsn, RecordKind, LSN_INVALID};

/// What recovery found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryInfo {
    /// The journal was empty or ended with a checkpoint.
    pub clean_shutdown: bool,
    /// The checkpoint recovery started from, if the journal had one.
    pub checkpoint: Option<Lsn>,
    /// Entries handed to the redo visitor.
    pub replayed: usize,
    pub torn_tail: Option<Lsn>,
    /// Highest transaction id seen, used to seed the transaction counter.
    pub max_txn_id: u64,
    /// The checkpoint written after replay.
    pub recovery_checkpoint: Option<Lsn>,
}

pub(crate) fn recover<F>(journal: &Journal, mut redo: F) -> JournalResult<RecoveryInfo>
where
    F: FnMut(Lsn, &JournalRecord),
{
    let tail = match journal.last_entry() {
        Ok(None) => {
            tracing::debug!(dir = %journal.dir().display(), "journal is empty, nothing to recover");
            return Ok(RecoveryInfo {
                clean_shutdown: true,
                ..RecoveryInfo::default()
            });
        }
        Ok(Some(tail)) => Some(tail),
        Err(JournalError::Corrupt { lsn, detail }) => {
            tracing::warn!(%lsn, %detail, "journal tail is unreadable, running recovery");
            None
        }
        Err(e) => return Err(e),
    };

    if let Some((lsn, record)) = &tail {
        if record.kind == RecordKind::Checkpoint {
            let removed = journal.remove_segments_before(lsn.segment())?;
            tracing::info!(checkpoint = %lsn, removed, "journal was shut down cleanly");
            return Ok(RecoveryInfo {
                clean_shutdown: true,
                checkpoint: Some(*lsn),
                max_txn_id: record.txn_id,
                ..RecoveryInfo::default()
            });
        }
    }

    let checkpoint = journal.find_last_checkpoint()?;
    let from = checkpoint.as_ref().map_or(LSN_INVALID, |(lsn, _)| *lsn);
    let mut max_txn_id = checkpoint.as_ref().map_or(0, |(_, record)| record.txn_id);
    let mut replayed = 0;

    let summary = journal.replay(from, |lsn, record| {
        max_txn_id = max_txn_id.max(record.txn_id);
        if lsn == from {
            return;
        }
        redo(lsn, record);
        replayed += 1;
    })?;

    let written = journal.checkpoint(max_txn_id.saturating_add(1), true)?;

    tracing::info!(
        checkpoint = %from,
        replayed,
        segments = summary.segments,
        torn = summary.torn_tail.is_some(),
        "journal recovery complete"
    );

    Ok(RecoveryInfo {
        clean_shutdown: false,
        checkpoint: checkpoint.map(|(lsn, _)| lsn),
        replayed,
        torn_tail: summary.torn_tail,
        max_txn_id,
        recovery_checkpoint: Some(written.lsn),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JournalConfig;
    use tempfile::tempdir;

    fn op(txn: u64, payload: &[u8]) -> JournalRecord {
        JournalRecord::operation(0x20, txn, payload.to_vec())
    }

    #[test]
    fn empty_journal_is_clean() {
        let dir = tempdir().expect("should create temp dir");
        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");

        let info = recover(&journal, |_, _| panic!("nothing to redo")).expect("should recover");
        assert!(info.clean_shutdown);
        assert_eq!(info.replayed, 0);
    }

    #[test]
    fn clean_shutdown_skips_replay() {
        let dir = tempdir().expect("should create temp dir");
        {
            let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            journal.append(&op(3, b"x")).expect("should append");
            journal.shutdown(4, true).expect("should shut down");
        }

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should reopen");
        let info = recover(&journal, |_, _| panic!("nothing to redo")).expect("should recover");
        assert!(info.clean_shutdown);
        assert_eq!(info.max_txn_id, 4);
        assert!(info.checkpoint.is_some());
    }

    #[test]
    fn clean_restarts_do_not_accumulate_segments() {
        let dir = tempdir().expect("should create temp dir");
        for txn in 1..=5 {
            let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            let info = recover(&journal, |_, _| panic!("nothing to redo")).expect("should recover");
            assert!(info.clean_shutdown);
            journal.append(&op(txn, b"work")).expect("should append");
            journal.shutdown(txn, true).expect("should shut down");
        }

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");
        recover(&journal, |_, _| panic!("nothing to redo")).expect("should recover");
        assert!(journal.segments().expect("should list").len() <= 2);
    }

    #[test]
    fn crash_replays_entries_after_the_last_checkpoint() {
        let dir = tempdir().expect("should create temp dir");
        {
            let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            journal.append(&op(1, b"before")).expect("should append");
            journal.checkpoint(2, false).expect("should checkpoint");
            journal.append(&op(7, b"after-1")).expect("should append");
            journal.append(&op(8, b"after-2")).expect("should append");
            journal.flush_all(true).expect("should flush");
        }

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should reopen");
        let mut seen = Vec::new();
        let info = recover(&journal, |_, record| seen.push(record.payload.clone()))
            .expect("should recover");

        assert!(!info.clean_shutdown);
        assert_eq!(info.replayed, 2);
        assert_eq!(seen, vec![b"after-1".to_vec(), b"after-2".to_vec()]);
        assert_eq!(info.max_txn_id, 8);

        let segments = journal.segments().expect("should list");
        assert!(!segments.contains(&1), "replayed segment should be deleted");
    }

    #[test]
    fn crash_without_checkpoint_replays_everything() {
        let dir = tempdir().expect("should create temp dir");
        {
            let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            journal.append(&op(1, b"a")).expect("should append");
            journal.append(&op(1, b"b")).expect("should append");
            journal.flush_all(true).expect("should flush");
        }

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should reopen");
        let info = recover(&journal, |_, _| {}).expect("should recover");
        assert_eq!(info.checkpoint, None);
        assert_eq!(info.replayed, 2);
        assert!(info.recovery_checkpoint.is_some());
    }
}

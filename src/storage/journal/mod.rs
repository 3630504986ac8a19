//! # Write-Ahead Journal
//!
//! The journal is an append-only log of records split over numbered segment
//! files. Appending a record mints its LSN; flushing makes every record up to
//! an LSN durable; a checkpoint marks a point recovery can start from and may
//! switch to a fresh segment so older ones can be deleted.
//!
//! ```text
//! journal_dir/
//! ├── 0000000003.log    # holds the latest checkpoint
//! └── 0000000004.log    # current segment, appends go here
//! ```
//!
//! ## Write Protocol
//!
//! 1. `append` encodes the entry into an in-memory buffer and returns its LSN
//!    `(segment, byte offset + 1)`
//! 2. the buffer is handed to the OS when it fills up or on `flush`
//! 3. `flush(lsn, true)` additionally fsyncs, after which every entry with an
//!    LSN `<= lsn` survives a crash
//!
//! `append_group` is the commit path: unless group commit is enabled it
//! flushes and syncs before returning.
//!
//! ## Checkpointing
//!
//! `checkpoint(txn_id, switch_files)` appends a checkpoint record, syncs it and
//! optionally starts a new segment. When files are switched every segment
//! older than the one holding the checkpoint is deleted. Registered listeners
//! run after each checkpoint.
//!
//! ## Recovery
//!
//! `replay` walks all segments in order. An incomplete or checksum-failing
//! final entry at the tail of the journal is the normal result of a crash
//! during append and ends the log with a warning. The same damage anywhere
//! else means the journal cannot be trusted and replay fails.
//!
//! ## Thread Safety
//!
//! `Journal` is `Send + Sync`. Appends and flushes are serialized by an
//! internal `parking_lot::Mutex`; LSNs are therefore strictly increasing in
//! append order.

mod format;
mod segment;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

pub use format::{
    decode_entry, encode_entry, DecodeError, EntryHeader, JournalFileHeader, JournalRecord,
    RecordKind, OPERATION_KIND_BASE,
};
pub use segment::{list_segments, segment_file_name, ReadOutcome, SegmentReader, SegmentWriter};

use crate::config::{
    DEFAULT_JOURNAL_MAX_SEGMENT_SIZE, JOURNAL_BUFFER_SIZE, JOURNAL_FILE_HEADER_SIZE,
    MAX_JOURNAL_SEGMENT,
};
use crate::error::JournalError;
use crate::storage::{Lsn, LSN_INVALID};

pub type JournalResult<T> = std::result::Result<T, JournalError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalConfig {
    /// When set, `append_group` leaves syncing to the caller's next flush.
    pub group_commit: bool,
    /// Segment size at which `needs_checkpoint` reports true.
    pub max_segment_size: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            group_commit: false,
            max_segment_size: DEFAULT_JOURNAL_MAX_SEGMENT_SIZE,
        }
    }
}

/// What a completed checkpoint did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointInfo {
    pub txn_id: u64,
    pub lsn: Lsn,
    pub switched_files: bool,
    pub removed_segments: usize,
}

/// Called after every checkpoint. Returning `false` unregisters the listener.
pub type CheckpointListener = Box<dyn FnMut(&CheckpointInfo) -> bool + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaySummary {
    pub entries: usize,
    pub segments: usize,
    pub last_lsn: Lsn,
    /// Where the log was cut short by a torn final entry, if it was.
    pub torn_tail: Option<Lsn>,
}

pub struct Journal {
    dir: PathBuf,
    config: JournalConfig,
    inner: Mutex<JournalInner>,
    listeners: Mutex<Vec<CheckpointListener>>,
}

struct JournalInner {
    writer: SegmentWriter,
    buffer: Vec<u8>,
    last_written: Lsn,
    last_flushed: Lsn,
    last_synced: Lsn,
    last_checkpoint: Lsn,
    closed: bool,
}

impl JournalInner {
    fn ensure_open(&self) -> JournalResult<()> {
        if self.closed {
            return Err(JournalError::Closed);
        }
        Ok(())
    }

    fn append(&mut self, record: &JournalRecord) -> JournalResult<Lsn> {
        self.ensure_open()?;

        let offset = self.writer.len() + self.buffer.len() as u64;
        format::encode_entry(record, &mut self.buffer)?;

        let lsn = Lsn::new(self.writer.number(), offset as i64 + 1);
        self.last_written = lsn;

        if self.buffer.len() >= JOURNAL_BUFFER_SIZE {
            self.write_buffer()?;
        }
        Ok(lsn)
    }

    fn write_buffer(&mut self) -> JournalResult<()> {
        self.writer.write_all(&self.buffer)?;
        self.buffer.clear();
        self.last_flushed = self.last_written;
        Ok(())
    }

    fn flush(&mut self, upto: Lsn, fsync: bool) -> JournalResult<()> {
        let written = upto <= self.last_flushed;
        let synced = !fsync || upto <= self.last_synced;
        if written && synced {
            return Ok(());
        }

        self.write_buffer()?;
        if fsync {
            self.writer.sync()?;
            self.last_synced = self.last_flushed;
        }
        Ok(())
    }

    fn switch_segment(&mut self, dir: &Path) -> JournalResult<()> {
        self.flush(self.last_written, true)?;

        let current = self.writer.number();
        let next = current
            .checked_add(1)
            .filter(|n| *n <= MAX_JOURNAL_SEGMENT)
            .ok_or(JournalError::SegmentsExhausted { last: current })?;

        self.writer = SegmentWriter::create(dir, next)?;
        tracing::debug!(segment = next, "switched journal segment");
        Ok(())
    }
}

impl Journal {
    /// Opens the journal in `dir`, creating the directory if needed. Existing
    /// segments are left untouched for replay. Appends go to the newest
    /// segment if it holds no entries yet, otherwise to a new segment
    /// numbered after it.
    pub fn open(dir: &Path, config: JournalConfig) -> JournalResult<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| JournalError::io(format!("creating journal directory {:?}", dir), e))?;

        let existing = segment::list_segments(dir)?;
        let (writer, reused) = match existing.last() {
            None => (SegmentWriter::create(dir, 1)?, false),
            Some((last, path)) if !SegmentReader::open(path, *last)?.has_entries() => {
                (SegmentWriter::reopen(path, *last)?, true)
            }
            Some((last, _)) => {
                let next = last
                    .checked_add(1)
                    .filter(|n| *n <= MAX_JOURNAL_SEGMENT)
                    .ok_or(JournalError::SegmentsExhausted { last: *last })?;
                (SegmentWriter::create(dir, next)?, false)
            }
        };

        tracing::debug!(
            dir = %dir.display(),
            segment = writer.number(),
            reused,
            existing = existing.len(),
            "opened journal"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            inner: Mutex::new(JournalInner {
                writer,
                buffer: Vec::with_capacity(JOURNAL_BUFFER_SIZE),
                last_written: LSN_INVALID,
                last_flushed: LSN_INVALID,
                last_synced: LSN_INVALID,
                last_checkpoint: LSN_INVALID,
                closed: false,
            }),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Appends a record and returns its LSN. The record is buffered, not yet
    /// durable.
    pub fn append(&self, record: &JournalRecord) -> JournalResult<Lsn> {
        self.inner.lock().append(record)
    }

    /// Appends a commit-path record, syncing it unless group commit is on.
    pub fn append_group(&self, record: &JournalRecord) -> JournalResult<Lsn> {
        let mut inner = self.inner.lock();
        let lsn = inner.append(record)?;
        if !self.config.group_commit {
            inner.flush(lsn, true)?;
        }
        Ok(lsn)
    }

    /// Writes out every buffered entry up to `upto`; with `fsync` the entries
    /// are durable when this returns.
    pub fn flush(&self, upto: Lsn, fsync: bool) -> JournalResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.flush(upto, fsync)
    }

    pub fn flush_all(&self, fsync: bool) -> JournalResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        let upto = inner.last_written;
        inner.flush(upto, fsync)
    }

    /// Appends and syncs a checkpoint record, optionally switching to a new
    /// segment and deleting the segments the checkpoint made obsolete.
    pub fn checkpoint(&self, txn_id: u64, switch_files: bool) -> JournalResult<CheckpointInfo> {
        let info = {
            let mut inner = self.inner.lock();
            let lsn = inner.append(&JournalRecord::checkpoint(txn_id, now_millis()))?;
            inner.flush(lsn, true)?;
            inner.last_checkpoint = lsn;

            let mut removed_segments = 0;
            if switch_files {
                inner.switch_segment(&self.dir)?;
                removed_segments = self.remove_segments_before(lsn.segment())?;
            }

            CheckpointInfo {
                txn_id,
                lsn,
                switched_files: switch_files,
                removed_segments,
            }
        };

        tracing::info!(
            lsn = %info.lsn,
            txn_id,
            switched = info.switched_files,
            removed = info.removed_segments,
            "journal checkpoint"
        );

        self.listeners.lock().retain_mut(|listener| listener(&info));
        Ok(info)
    }

    /// Deletes every segment numbered below `keep_from`.
    pub(crate) fn remove_segments_before(&self, keep_from: i16) -> JournalResult<usize> {
        let mut removed = 0;
        for (number, path) in segment::list_segments(&self.dir)? {
            if number >= keep_from {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(segment = number, error = %e, "failed to delete journal segment");
                }
            }
        }
        Ok(removed)
    }

    pub fn add_checkpoint_listener<F>(&self, listener: F)
    where
        F: FnMut(&CheckpointInfo) -> bool + Send + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Visits every entry with an LSN `>= from`, oldest first.
    pub fn replay<F>(&self, from: Lsn, mut visit: F) -> JournalResult<ReplaySummary>
    where
        F: FnMut(Lsn, &JournalRecord),
    {
        {
            let mut inner = self.inner.lock();
            if !inner.closed {
                inner.write_buffer()?;
            }
        }

        let segments = segment::list_segments(&self.dir)?;
        let mut readers = Vec::with_capacity(segments.len());
        for (number, path) in &segments {
            if from.is_valid() && *number < from.segment() {
                continue;
            }
            readers.push(SegmentReader::open(path, *number)?);
        }
        let tail = readers.iter().rposition(SegmentReader::has_entries);

        let mut summary = ReplaySummary {
            last_lsn: LSN_INVALID,
            ..ReplaySummary::default()
        };

        for (index, mut reader) in readers.into_iter().enumerate() {
            summary.segments += 1;
            loop {
                match reader.next_entry()? {
                    ReadOutcome::Entry(lsn, record) => {
                        if lsn < from {
                            continue;
                        }
                        visit(lsn, &record);
                        summary.entries += 1;
                        summary.last_lsn = lsn;
                    }
                    ReadOutcome::End => break,
                    ReadOutcome::Torn { lsn, detail } => {
                        if Some(index) != tail {
                            return Err(JournalError::Corrupt { lsn, detail });
                        }
                        tracing::warn!(%lsn, %detail, "journal ends with a torn entry, ignoring it");
                        summary.torn_tail = Some(lsn);
                        break;
                    }
                }
            }
        }

        Ok(summary)
    }

    /// The most recent checkpoint record on disk.
    pub fn find_last_checkpoint(&self) -> JournalResult<Option<(Lsn, JournalRecord)>> {
        let mut last = None;
        self.replay(LSN_INVALID, |lsn, record| {
            if record.kind == RecordKind::Checkpoint {
                last = Some((lsn, record.clone()));
            }
        })?;
        Ok(last)
    }

    /// The final entry of the newest non-empty segment, found via back-links.
    pub fn last_entry(&self) -> JournalResult<Option<(Lsn, JournalRecord)>> {
        {
            let mut inner = self.inner.lock();
            if !inner.closed {
                inner.write_buffer()?;
            }
        }

        for (number, path) in segment::list_segments(&self.dir)?.iter().rev() {
            let mut reader = SegmentReader::open(path, *number)?;
            if reader.has_entries() {
                return reader.last_entry();
            }
        }
        Ok(None)
    }

    /// Optionally checkpoints, then syncs and closes the journal. Further
    /// appends fail with `JournalError::Closed`.
    pub fn shutdown(&self, txn_id: u64, checkpoint: bool) -> JournalResult<()> {
        if self.inner.lock().closed {
            return Ok(());
        }
        if checkpoint {
            self.checkpoint(txn_id, false)?;
        }

        let mut inner = self.inner.lock();
        let upto = inner.last_written;
        inner.flush(upto, true)?;
        inner.closed = true;
        tracing::debug!(lsn = %upto, "journal shut down");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// True once the current segment has grown past `max_segment_size`.
    pub fn needs_checkpoint(&self) -> bool {
        self.current_size() >= self.config.max_segment_size
    }

    pub fn current_size(&self) -> u64 {
        let inner = self.inner.lock();
        inner.writer.len() + inner.buffer.len() as u64
    }

    pub fn current_segment(&self) -> i16 {
        self.inner.lock().writer.number()
    }

    pub fn last_written_lsn(&self) -> Lsn {
        self.inner.lock().last_written
    }

    pub fn last_flushed_lsn(&self) -> Lsn {
        self.inner.lock().last_flushed
    }

    pub fn last_synced_lsn(&self) -> Lsn {
        self.inner.lock().last_synced
    }

    pub fn last_checkpoint_lsn(&self) -> Lsn {
        self.inner.lock().last_checkpoint
    }

    pub fn segments(&self) -> JournalResult<Vec<i16>> {
        Ok(segment::list_segments(&self.dir)?
            .into_iter()
            .map(|(number, _)| number)
            .collect())
    }

    /// Whether the current segment holds nothing but its header.
    pub fn is_current_segment_empty(&self) -> bool {
        self.current_size() == JOURNAL_FILE_HEADER_SIZE as u64
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.closed {
            return;
        }
        if let Err(e) = inner.write_buffer() {
            tracing::warn!(error = %e, "failed to write journal buffer on drop");
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn op(txn: u64, payload: &[u8]) -> JournalRecord {
        JournalRecord::operation(0x20, txn, payload.to_vec())
    }

    fn collect(journal: &Journal, from: Lsn) -> (Vec<(Lsn, JournalRecord)>, ReplaySummary) {
        let mut seen = Vec::new();
        let summary = journal
            .replay(from, |lsn, record| seen.push((lsn, record.clone())))
            .expect("should replay");
        (seen, summary)
    }

    #[test]
    fn first_lsn_points_past_the_file_header() {
        let dir = tempdir().expect("should create temp dir");
        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");

        let lsn = journal.append(&op(1, b"a")).expect("should append");
        assert_eq!(lsn, Lsn::new(1, JOURNAL_FILE_HEADER_SIZE as i64 + 1));
        assert_eq!(journal.last_written_lsn(), lsn);
    }

    #[test]
    fn lsns_increase_in_append_order() {
        let dir = tempdir().expect("should create temp dir");
        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");

        let a = journal.append(&op(1, b"first")).expect("should append");
        let b = journal.append(&op(1, b"second")).expect("should append");
        let c = journal.append(&op(2, b"")).expect("should append");
        assert!(a < b && b < c);
        assert_eq!(
            b.offset() - a.offset(),
            op(1, b"first").encoded_len() as i64
        );
    }

    #[test]
    fn flush_with_fsync_advances_synced_lsn() {
        let dir = tempdir().expect("should create temp dir");
        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");

        let lsn = journal.append(&op(1, b"x")).expect("should append");
        assert_eq!(journal.last_flushed_lsn(), LSN_INVALID);

        journal.flush(lsn, false).expect("should flush");
        assert_eq!(journal.last_flushed_lsn(), lsn);
        assert_eq!(journal.last_synced_lsn(), LSN_INVALID);

        journal.flush(lsn, true).expect("should sync");
        assert_eq!(journal.last_synced_lsn(), lsn);
    }

    #[test]
    fn append_group_syncs_without_group_commit() {
        let dir = tempdir().expect("should create temp dir");
        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");

        let lsn = journal
            .append_group(&JournalRecord::new(RecordKind::TxnCommit, 7, Vec::new()))
            .expect("should append");
        assert_eq!(journal.last_synced_lsn(), lsn);
    }

    #[test]
    fn append_group_defers_sync_with_group_commit() {
        let dir = tempdir().expect("should create temp dir");
        let config = JournalConfig {
            group_commit: true,
            ..JournalConfig::default()
        };
        let journal = Journal::open(dir.path(), config).expect("should open");

        journal
            .append_group(&JournalRecord::new(RecordKind::TxnCommit, 7, Vec::new()))
            .expect("should append");
        assert_eq!(journal.last_synced_lsn(), LSN_INVALID);
    }

    #[test]
    fn replay_returns_records_from_a_previous_session() {
        let dir = tempdir().expect("should create temp dir");
        {
            let journal =
                Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            journal.append(&op(1, b"one")).expect("should append");
            journal.append(&op(2, b"two")).expect("should append");
            journal.shutdown(3, false).expect("should shut down");
        }

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should reopen");
        assert_eq!(journal.current_segment(), 2);

        let (seen, summary) = collect(&journal, LSN_INVALID);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1.payload, b"one");
        assert_eq!(seen[1].1.txn_id, 2);
        assert_eq!(summary.torn_tail, None);
        assert_eq!(summary.last_lsn, seen[1].0);
    }

    #[test]
    fn replay_skips_entries_before_from() {
        let dir = tempdir().expect("should create temp dir");
        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");

        journal.append(&op(1, b"old")).expect("should append");
        let from = journal.append(&op(2, b"new")).expect("should append");

        let (seen, _) = collect(&journal, from);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, from);
    }

    #[test]
    fn checkpoint_with_switch_deletes_older_segments() {
        let dir = tempdir().expect("should create temp dir");
        {
            let journal =
                Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            journal.append(&op(1, b"old")).expect("should append");
            journal.shutdown(1, false).expect("should shut down");
        }

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should reopen");
        assert_eq!(journal.segments().expect("should list"), vec![1, 2]);

        let info = journal.checkpoint(5, true).expect("should checkpoint");
        assert_eq!(info.lsn.segment(), 2);
        assert_eq!(info.removed_segments, 1);
        assert_eq!(journal.current_segment(), 3);
        assert_eq!(journal.segments().expect("should list"), vec![2, 3]);
        assert_eq!(journal.last_checkpoint_lsn(), info.lsn);

        let (lsn, record) = journal
            .find_last_checkpoint()
            .expect("should scan")
            .expect("should find checkpoint");
        assert_eq!(lsn, info.lsn);
        assert_eq!(record.txn_id, 5);
        assert!(record.checkpoint_timestamp().is_some());
    }

    #[test]
    fn checkpoint_listeners_run_until_they_unregister() {
        let dir = tempdir().expect("should create temp dir");
        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        journal.add_checkpoint_listener(move |_| counter.fetch_add(1, Ordering::SeqCst) == 0);

        journal.checkpoint(1, false).expect("should checkpoint");
        journal.checkpoint(2, false).expect("should checkpoint");
        journal.checkpoint(3, false).expect("should checkpoint");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn last_entry_finds_clean_shutdown_checkpoint() {
        let dir = tempdir().expect("should create temp dir");
        {
            let journal =
                Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            journal.append(&op(1, b"work")).expect("should append");
            journal.shutdown(9, true).expect("should shut down");
        }

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should reopen");
        let (_, record) = journal
            .last_entry()
            .expect("should read")
            .expect("should have an entry");
        assert_eq!(record.kind, RecordKind::Checkpoint);
        assert_eq!(record.txn_id, 9);
    }

    #[test]
    fn torn_tail_ends_replay_without_error() {
        let dir = tempdir().expect("should create temp dir");
        let path = {
            let journal =
                Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            journal.append(&op(1, b"kept")).expect("should append");
            journal.append(&op(2, b"torn by the crash")).expect("should append");
            journal.shutdown(0, false).expect("should shut down");
            dir.path().join(segment_file_name(1))
        };

        let len = fs::metadata(&path).expect("should stat").len();
        let file = OpenOptions::new().write(true).open(&path).expect("should open");
        file.set_len(len - 5).expect("should truncate");

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should reopen");
        let (seen, summary) = collect(&journal, LSN_INVALID);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1.payload, b"kept");
        assert!(summary.torn_tail.is_some());
    }

    #[test]
    fn corruption_before_the_tail_is_fatal() {
        let dir = tempdir().expect("should create temp dir");
        let path = {
            let journal =
                Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            journal.append(&op(1, b"damaged")).expect("should append");
            journal.append(&op(2, b"intact")).expect("should append");
            journal.shutdown(0, false).expect("should shut down");
            dir.path().join(segment_file_name(1))
        };

        let mut bytes = fs::read(&path).expect("should read");
        bytes[JOURNAL_FILE_HEADER_SIZE + 12] ^= 0xFF;
        fs::write(&path, bytes).expect("should write");

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should reopen");
        let err = journal.replay(LSN_INVALID, |_, _| {}).unwrap_err();
        assert!(matches!(err, JournalError::Corrupt { .. }));
    }

    #[test]
    fn closed_journal_rejects_appends() {
        let dir = tempdir().expect("should create temp dir");
        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");
        journal.shutdown(0, false).expect("should shut down");
        journal.shutdown(0, false).expect("second shutdown is a no-op");

        assert!(journal.is_closed());
        assert!(matches!(journal.append(&op(1, b"late")), Err(JournalError::Closed)));
    }

    #[test]
    fn needs_checkpoint_tracks_segment_size() {
        let dir = tempdir().expect("should create temp dir");
        let config = JournalConfig {
            max_segment_size: 256,
            ..JournalConfig::default()
        };
        let journal = Journal::open(dir.path(), config).expect("should open");
        assert!(journal.is_current_segment_empty());
        assert!(!journal.needs_checkpoint());

        journal.append(&op(1, &[0u8; 300])).expect("should append");
        assert!(journal.needs_checkpoint());

        journal.checkpoint(1, true).expect("should checkpoint");
        assert!(!journal.needs_checkpoint());
    }

    #[test]
    fn reopening_reuses_an_empty_newest_segment() {
        let dir = tempdir().expect("should create temp dir");
        for _ in 0..5 {
            let journal =
                Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            assert_eq!(journal.current_segment(), 1);
            journal.shutdown(0, false).expect("should shut down");
        }
        assert_eq!(
            segment::list_segments(dir.path())
                .expect("should list")
                .len(),
            1
        );

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");
        let lsn = journal.append(&op(1, b"first")).expect("should append");
        assert_eq!(lsn, Lsn::new(1, JOURNAL_FILE_HEADER_SIZE as i64 + 1));
    }

    #[test]
    fn empty_newest_segment_at_the_limit_still_opens() {
        let dir = tempdir().expect("should create temp dir");
        SegmentWriter::create(dir.path(), MAX_JOURNAL_SEGMENT).expect("should create segment");

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should open");
        assert_eq!(journal.current_segment(), MAX_JOURNAL_SEGMENT);
        journal.checkpoint(1, false).expect("should checkpoint in place");
    }

    #[test]
    fn oversized_length_in_an_early_entry_fails_replay() {
        let dir = tempdir().expect("should create temp dir");
        let path = {
            let journal =
                Journal::open(dir.path(), JournalConfig::default()).expect("should open");
            journal.append(&op(1, b"first")).expect("should append");
            journal.append(&op(2, b"second")).expect("should append");
            journal.append(&op(3, b"third")).expect("should append");
            journal.shutdown(0, false).expect("should shut down");
            dir.path().join(segment_file_name(1))
        };

        let mut bytes = fs::read(&path).expect("should read");
        // High byte of the first entry's payload size.
        bytes[JOURNAL_FILE_HEADER_SIZE + 10] = 0x7F;
        fs::write(&path, bytes).expect("should write");

        let journal = Journal::open(dir.path(), JournalConfig::default()).expect("should reopen");
        let mut visited = 0;
        let err = journal.replay(LSN_INVALID, |_, _| visited += 1).unwrap_err();
        assert!(matches!(err, JournalError::Corrupt { .. }));
        assert_eq!(visited, 0);
    }

    #[test]
    fn exhausted_segment_numbers_fail_open() {
        let dir = tempdir().expect("should create temp dir");
        let mut last =
            SegmentWriter::create(dir.path(), MAX_JOURNAL_SEGMENT).expect("should create segment");
        let mut buf = Vec::new();
        encode_entry(&op(1, b"full"), &mut buf).expect("should encode");
        last.write_all(&buf).expect("should write");

        assert!(matches!(
            Journal::open(dir.path(), JournalConfig::default()),
            Err(JournalError::SegmentsExhausted { .. })
        ));
    }
}

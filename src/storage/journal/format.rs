//! # Journal Entry Format
//!
//! Every segment file starts with a 6-byte header followed by a sequence of
//! self-describing entries:
//!
//! ```text
//! +-------------------+
//! | magic (4)         |  0E 0D 0B 01
//! | version (2)       |  little-endian u16
//! +-------------------+
//! | entry 0           |  <- LSN (segment, 6 + 1)
//! | entry 1           |
//! | ...               |
//! +-------------------+
//!
//! entry:
//! +------+---------+---------+-------------+-----------+-------------+
//! | kind | txn id  | size    | payload     | back-link | checksum    |
//! | u8   | u64 LE  | u16 LE  | size bytes  | u16 LE    | CRC-64 LE   |
//! +------+---------+---------+-------------+-----------+-------------+
//! ```
//!
//! The back-link equals `size + JOURNAL_ENTRY_HEADER_SIZE` so a reader can walk
//! backwards from the end of a file. The checksum covers header, payload and
//! back-link.
//!
//! Decoding distinguishes a torn entry (the buffer ends before the entry does,
//! which is what a crash during append leaves behind) from a corrupt one
//! (complete but inconsistent). Recovery tolerates the former only at the tail
//! of the journal.

use crc::{Crc, CRC_64_ECMA_182};
use zerocopy::little_endian::{U16, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    JOURNAL_BACK_LINK_SIZE, JOURNAL_CHECKSUM_SIZE, JOURNAL_ENTRY_HEADER_SIZE,
    JOURNAL_ENTRY_OVERHEAD, JOURNAL_FILE_HEADER_SIZE, JOURNAL_MAGIC, JOURNAL_VERSION,
    MAX_JOURNAL_PAYLOAD,
};
use crate::error::JournalError;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Lowest kind code available to operation records of external collaborators.
pub const OPERATION_KIND_BASE: u8 = 0x10;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct JournalFileHeader {
    magic: [u8; 4],
    version: U16,
}

const _: () = assert!(std::mem::size_of::<JournalFileHeader>() == JOURNAL_FILE_HEADER_SIZE);

impl JournalFileHeader {
    pub fn new() -> Self {
        Self {
            magic: JOURNAL_MAGIC,
            version: U16::new(JOURNAL_VERSION),
        }
    }

    /// Parses and validates a segment header. The error string is the reason.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self, String> {
        let raw = bytes
            .get(..JOURNAL_FILE_HEADER_SIZE)
            .ok_or_else(|| format!("file shorter than {} byte header", JOURNAL_FILE_HEADER_SIZE))?;
        let header = Self::ref_from_bytes(raw).map_err(|e| format!("{:?}", e))?;

        if header.magic != JOURNAL_MAGIC {
            return Err("not a journal file (bad magic)".to_string());
        }
        if header.version() != JOURNAL_VERSION {
            return Err(format!(
                "journal version {} but required version {}",
                header.version(),
                JOURNAL_VERSION
            ));
        }
        Ok(header)
    }

    crate::zerocopy_getters! {
        version: u16,
    }
}

impl Default for JournalFileHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EntryHeader {
    kind: u8,
    txn_id: U64,
    size: U16,
}

const _: () = assert!(std::mem::size_of::<EntryHeader>() == JOURNAL_ENTRY_HEADER_SIZE);

impl EntryHeader {
    pub fn new(kind: RecordKind, txn_id: u64, size: u16) -> Self {
        Self {
            kind: kind.code(),
            txn_id: U64::new(txn_id),
            size: U16::new(size),
        }
    }

    pub fn kind_code(&self) -> u8 {
        self.kind
    }

    crate::zerocopy_getters! {
        txn_id: u64,
        size: u16,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    TxnStart,
    TxnCommit,
    TxnAbort,
    Checkpoint,
    /// Opaque operation record owned by a layer above the kernel
    /// (document store, indexes). The code is `>= OPERATION_KIND_BASE`.
    Operation(u8),
}

impl RecordKind {
    pub fn code(&self) -> u8 {
        match self {
            RecordKind::TxnStart => 0x01,
            RecordKind::TxnCommit => 0x02,
            RecordKind::TxnAbort => 0x03,
            RecordKind::Checkpoint => 0x04,
            RecordKind::Operation(code) => *code,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(RecordKind::TxnStart),
            0x02 => Some(RecordKind::TxnCommit),
            0x03 => Some(RecordKind::TxnAbort),
            0x04 => Some(RecordKind::Checkpoint),
            c if c >= OPERATION_KIND_BASE => Some(RecordKind::Operation(c)),
            _ => None,
        }
    }
}

/// A single journal record as appended by a caller or produced by replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub kind: RecordKind,
    pub txn_id: u64,
    pub payload: Vec<u8>,
}

impl JournalRecord {
    pub fn new(kind: RecordKind, txn_id: u64, payload: Vec<u8>) -> Self {
        Self {
            kind,
            txn_id,
            payload,
        }
    }

    /// An operation record. Codes below `OPERATION_KIND_BASE` are reserved and
    /// are shifted into the operation range.
    pub fn operation(code: u8, txn_id: u64, payload: impl Into<Vec<u8>>) -> Self {
        let code = code.max(OPERATION_KIND_BASE);
        Self::new(RecordKind::Operation(code), txn_id, payload.into())
    }

    /// A checkpoint record stamped with the wall-clock time in milliseconds.
    pub fn checkpoint(txn_id: u64, timestamp_ms: u64) -> Self {
        Self::new(
            RecordKind::Checkpoint,
            txn_id,
            timestamp_ms.to_le_bytes().to_vec(),
        )
    }

    /// Timestamp carried by a checkpoint record.
    pub fn checkpoint_timestamp(&self) -> Option<u64> {
        if self.kind != RecordKind::Checkpoint {
            return None;
        }
        let bytes: [u8; 8] = self.payload.get(..8)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    pub fn encoded_len(&self) -> usize {
        self.payload.len() + JOURNAL_ENTRY_OVERHEAD
    }
}

/// Appends the encoded entry for `record` to `out`.
pub fn encode_entry(record: &JournalRecord, out: &mut Vec<u8>) -> Result<usize, JournalError> {
    let size = record.payload.len();
    if size > MAX_JOURNAL_PAYLOAD {
        return Err(JournalError::RecordTooLarge {
            size,
            max: MAX_JOURNAL_PAYLOAD,
        });
    }

    let start = out.len();
    let header = EntryHeader::new(record.kind, record.txn_id, size as u16);
    let back_link = (size + JOURNAL_ENTRY_HEADER_SIZE) as u16;

    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&record.payload);
    out.extend_from_slice(&back_link.to_le_bytes());

    let checksum = CRC64.checksum(&out[start..]);
    out.extend_from_slice(&checksum.to_le_bytes());

    Ok(out.len() - start)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ends inside the entry.
    Incomplete { needed: usize, available: usize },
    /// The entry is complete but fails validation.
    Corrupt(String),
}

/// Size of the entry starting at `bytes[0]` as declared by its header.
pub fn declared_entry_len(bytes: &[u8]) -> Result<usize, DecodeError> {
    let raw = bytes
        .get(..JOURNAL_ENTRY_HEADER_SIZE)
        .ok_or(DecodeError::Incomplete {
            needed: JOURNAL_ENTRY_HEADER_SIZE,
            available: bytes.len(),
        })?;
    let header = EntryHeader::ref_from_bytes(raw)
        .map_err(|e| DecodeError::Corrupt(format!("unreadable entry header: {:?}", e)))?;
    Ok(header.size() as usize + JOURNAL_ENTRY_OVERHEAD)
}

/// Decodes the entry at the start of `bytes`, returning it and its length.
pub fn decode_entry(bytes: &[u8]) -> Result<(JournalRecord, usize), DecodeError> {
    let total = declared_entry_len(bytes)?;
    if bytes.len() < total {
        return Err(DecodeError::Incomplete {
            needed: total,
            available: bytes.len(),
        });
    }

    let entry = &bytes[..total];
    let header = EntryHeader::ref_from_bytes(&entry[..JOURNAL_ENTRY_HEADER_SIZE])
        .map_err(|e| DecodeError::Corrupt(format!("unreadable entry header: {:?}", e)))?;
    let size = header.size() as usize;

    let checked_len = total - JOURNAL_CHECKSUM_SIZE;
    let mut stored = [0u8; JOURNAL_CHECKSUM_SIZE];
    stored.copy_from_slice(&entry[checked_len..]);
    let stored = u64::from_le_bytes(stored);
    let computed = CRC64.checksum(&entry[..checked_len]);
    if stored != computed {
        return Err(DecodeError::Corrupt(format!(
            "checksum mismatch: stored={:#018x} computed={:#018x}",
            stored, computed
        )));
    }

    let link_at = JOURNAL_ENTRY_HEADER_SIZE + size;
    let back_link = u16::from_le_bytes([entry[link_at], entry[link_at + 1]]) as usize;
    if back_link != size + JOURNAL_ENTRY_HEADER_SIZE {
        return Err(DecodeError::Corrupt(format!(
            "bad back-link {} for payload of {} bytes",
            back_link, size
        )));
    }

    let kind = RecordKind::from_code(header.kind_code())
        .ok_or_else(|| DecodeError::Corrupt(format!("unknown entry kind {:#04x}", header.kind_code())))?;

    let payload = entry[JOURNAL_ENTRY_HEADER_SIZE..link_at].to_vec();
    Ok((JournalRecord::new(kind, header.txn_id(), payload), total))
}

/// Reads the back-link stored just before the checksum at the end of `tail`.
pub fn back_link_before(tail: &[u8]) -> Option<usize> {
    let trailer = JOURNAL_BACK_LINK_SIZE + JOURNAL_CHECKSUM_SIZE;
    if tail.len() < trailer {
        return None;
    }
    let at = tail.len() - trailer;
    Some(u16::from_le_bytes([tail[at], tail[at + 1]]) as usize)
}

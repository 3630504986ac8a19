//! # Journal Segment Files
//!
//! A segment is one `NNNNNNNNNN.log` file in the journal directory. The number
//! in the file name is the segment component of every LSN minted while the
//! segment was current.
//!
//! `SegmentWriter` owns the append handle of the current segment.
//! `SegmentReader` walks a segment forward for replay, or jumps to its last
//! entry via the back-link trailer:
//!
//! ```text
//!                           file_len - 10
//!                                 │
//!   ... | header | payload | link | crc |
//!       ^                  │
//!       └──────── link ────┘
//! ```
//!
//! The reader snapshots the file length when it is opened, so entries appended
//! afterwards are not visited.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use zerocopy::IntoBytes;

use super::format::{self, DecodeError, JournalFileHeader, JournalRecord};
use crate::config::{
    JOURNAL_BACK_LINK_SIZE, JOURNAL_CHECKSUM_SIZE, JOURNAL_ENTRY_HEADER_SIZE,
    JOURNAL_FILE_EXTENSION, JOURNAL_FILE_HEADER_SIZE,
};
use crate::error::JournalError;
use crate::storage::Lsn;

pub fn segment_file_name(number: i16) -> String {
    format!("{:010}.{}", number, JOURNAL_FILE_EXTENSION)
}

pub fn parse_segment_file_name(name: &str) -> Option<i16> {
    let stem = name.strip_suffix(JOURNAL_FILE_EXTENSION)?.strip_suffix('.')?;
    if stem.len() != 10 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse::<i16>().ok().filter(|n| *n > 0)
}

/// Segment files in `dir`, ordered by segment number.
pub fn list_segments(dir: &Path) -> Result<Vec<(i16, PathBuf)>, JournalError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| JournalError::io(format!("listing journal directory {:?}", dir), e))?;

    let mut segments = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| JournalError::io("reading journal directory entry", e))?;
        let name = entry.file_name();
        if let Some(number) = name.to_str().and_then(parse_segment_file_name) {
            segments.push((number, entry.path()));
        }
    }
    segments.sort_by_key(|(number, _)| *number);
    Ok(segments)
}

pub struct SegmentWriter {
    number: i16,
    path: PathBuf,
    file: File,
    len: u64,
}

impl SegmentWriter {
    pub fn create(dir: &Path, number: i16) -> Result<Self, JournalError> {
        let path = dir.join(segment_file_name(number));
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .map_err(|e| JournalError::io(format!("creating journal segment {:?}", path), e))?;

        file.write_all(JournalFileHeader::new().as_bytes())
            .map_err(|e| JournalError::io(format!("writing header of {:?}", path), e))?;
        file.sync_all()
            .map_err(|e| JournalError::io(format!("syncing new segment {:?}", path), e))?;

        Ok(Self {
            number,
            path,
            file,
            len: JOURNAL_FILE_HEADER_SIZE as u64,
        })
    }

    /// Opens an existing segment for appending at its current end.
    pub fn reopen(path: &Path, number: i16) -> Result<Self, JournalError> {
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| JournalError::io(format!("reopening journal segment {:?}", path), e))?;
        let len = file
            .metadata()
            .map_err(|e| JournalError::io(format!("reading metadata of {:?}", path), e))?
            .len();

        Ok(Self {
            number,
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    pub fn number(&self) -> i16 {
        self.number
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes handed to the OS so far, including the file header.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), JournalError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.file
            .write_all(bytes)
            .map_err(|e| JournalError::io(format!("appending to {:?}", self.path), e))?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.file
            .sync_data()
            .map_err(|e| JournalError::io(format!("syncing {:?}", self.path), e))
    }
}

/// Result of reading the next entry of a segment.
#[derive(Debug)]
pub enum ReadOutcome {
    Entry(Lsn, JournalRecord),
    End,
    /// The final entry of the file is incomplete or fails its checksum, and
    /// no complete entry follows it.
    Torn { lsn: Lsn, detail: String },
}

pub struct SegmentReader {
    number: i16,
    path: PathBuf,
    reader: BufReader<File>,
    position: u64,
    file_len: u64,
}

impl SegmentReader {
    pub fn open(path: &Path, number: i16) -> Result<Self, JournalError> {
        let file = File::open(path)
            .map_err(|e| JournalError::io(format!("opening journal segment {:?}", path), e))?;
        let file_len = file
            .metadata()
            .map_err(|e| JournalError::io(format!("reading metadata of {:?}", path), e))?
            .len();

        let mut reader = BufReader::new(file);
        let mut header = [0u8; JOURNAL_FILE_HEADER_SIZE];
        if file_len < JOURNAL_FILE_HEADER_SIZE as u64 {
            return Err(JournalError::InvalidHeader {
                path: path.to_path_buf(),
                detail: format!("file is only {} bytes long", file_len),
            });
        }
        reader
            .read_exact(&mut header)
            .map_err(|e| JournalError::io(format!("reading header of {:?}", path), e))?;
        JournalFileHeader::from_bytes(&header).map_err(|detail| JournalError::InvalidHeader {
            path: path.to_path_buf(),
            detail,
        })?;

        Ok(Self {
            number,
            path: path.to_path_buf(),
            reader,
            position: JOURNAL_FILE_HEADER_SIZE as u64,
            file_len,
        })
    }

    pub fn number(&self) -> i16 {
        self.number
    }

    pub fn has_entries(&self) -> bool {
        self.file_len > JOURNAL_FILE_HEADER_SIZE as u64
    }

    fn lsn_at(&self, position: u64) -> Lsn {
        Lsn::new(self.number, position as i64 + 1)
    }

    pub fn next_entry(&mut self) -> Result<ReadOutcome, JournalError> {
        let remaining = self.file_len - self.position;
        if remaining == 0 {
            return Ok(ReadOutcome::End);
        }

        let lsn = self.lsn_at(self.position);
        if remaining < JOURNAL_ENTRY_HEADER_SIZE as u64 {
            return Ok(ReadOutcome::Torn {
                lsn,
                detail: format!("{} trailing bytes, shorter than an entry header", remaining),
            });
        }

        let mut header = [0u8; JOURNAL_ENTRY_HEADER_SIZE];
        self.read_exact(&mut header)?;
        let total = format::declared_entry_len(&header).map_err(|e| self.corrupt(lsn, e))?;
        if remaining < total as u64 {
            if self.ends_with_entry_after(self.position)? {
                return Err(JournalError::Corrupt {
                    lsn,
                    detail: format!(
                        "entry declares {} bytes past the end of the file, but a complete entry follows it",
                        total
                    ),
                });
            }
            return Ok(ReadOutcome::Torn {
                lsn,
                detail: format!("entry needs {} bytes, only {} remain", total, remaining),
            });
        }

        let mut entry = vec![0u8; total];
        entry[..JOURNAL_ENTRY_HEADER_SIZE].copy_from_slice(&header);
        self.read_exact(&mut entry[JOURNAL_ENTRY_HEADER_SIZE..])?;

        let entry_start = self.position;
        self.position += total as u64;

        match format::decode_entry(&entry) {
            Ok((record, _)) => Ok(ReadOutcome::Entry(lsn, record)),
            Err(DecodeError::Corrupt(detail)) if entry_start + total as u64 == self.file_len => {
                Ok(ReadOutcome::Torn { lsn, detail })
            }
            Err(e) => Err(self.corrupt(lsn, e)),
        }
    }

    /// Locates the final entry through its back-link without scanning.
    pub fn last_entry(&mut self) -> Result<Option<(Lsn, JournalRecord)>, JournalError> {
        if !self.has_entries() {
            return Ok(None);
        }

        let trailer = (JOURNAL_BACK_LINK_SIZE + JOURNAL_CHECKSUM_SIZE) as u64;
        let tail_lsn = self.lsn_at(self.file_len);
        if self.file_len < JOURNAL_FILE_HEADER_SIZE as u64 + trailer {
            return Err(JournalError::Corrupt {
                lsn: tail_lsn,
                detail: "segment too short for an entry trailer".to_string(),
            });
        }

        let mut tail = [0u8; JOURNAL_BACK_LINK_SIZE + JOURNAL_CHECKSUM_SIZE];
        self.seek(self.file_len - trailer)?;
        self.read_exact(&mut tail)?;
        let back_link = format::back_link_before(&tail).unwrap_or(0) as u64;

        let start = (self.file_len - trailer)
            .checked_sub(back_link)
            .filter(|start| *start >= JOURNAL_FILE_HEADER_SIZE as u64)
            .ok_or_else(|| JournalError::Corrupt {
                lsn: tail_lsn,
                detail: format!("back-link {} points before the first entry", back_link),
            })?;

        let lsn = self.lsn_at(start);
        let mut entry = vec![0u8; (self.file_len - start) as usize];
        self.seek(start)?;
        self.read_exact(&mut entry)?;
        self.position = self.file_len;

        let (record, len) = format::decode_entry(&entry).map_err(|e| self.corrupt(lsn, e))?;
        if len != entry.len() {
            return Err(JournalError::Corrupt {
                lsn,
                detail: "back-link does not land on an entry boundary".to_string(),
            });
        }
        Ok(Some((lsn, record)))
    }

    /// Whether the file ends in a complete, checksum-valid entry starting after
    /// `position`. A crash during append never leaves one behind a torn entry.
    fn ends_with_entry_after(&mut self, position: u64) -> Result<bool, JournalError> {
        let trailer = (JOURNAL_BACK_LINK_SIZE + JOURNAL_CHECKSUM_SIZE) as u64;
        if self.file_len < position + trailer {
            return Ok(false);
        }

        let mut tail = [0u8; JOURNAL_BACK_LINK_SIZE + JOURNAL_CHECKSUM_SIZE];
        self.seek(self.file_len - trailer)?;
        self.read_exact(&mut tail)?;
        let Some(back_link) = format::back_link_before(&tail) else {
            return Ok(false);
        };
        let start = match (self.file_len - trailer).checked_sub(back_link as u64) {
            Some(start) if start > position => start,
            _ => return Ok(false),
        };

        let mut entry = vec![0u8; (self.file_len - start) as usize];
        self.seek(start)?;
        self.read_exact(&mut entry)?;
        Ok(matches!(format::decode_entry(&entry), Ok((_, len)) if len == entry.len()))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), JournalError> {
        self.reader
            .read_exact(buf)
            .map_err(|e| JournalError::io(format!("reading {:?}", self.path), e))
    }

    fn seek(&mut self, position: u64) -> Result<(), JournalError> {
        self.reader
            .seek(SeekFrom::Start(position))
            .map_err(|e| JournalError::io(format!("seeking in {:?}", self.path), e))?;
        Ok(())
    }

    fn corrupt(&self, lsn: Lsn, err: DecodeError) -> JournalError {
        let detail = match err {
            DecodeError::Corrupt(detail) => detail,
            DecodeError::Incomplete { needed, available } => {
                format!("entry needs {} bytes, only {} available", needed, available)
            }
        };
        JournalError::Corrupt { lsn, detail }
    }
}

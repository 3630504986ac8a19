//! # Log Sequence Numbers
//!
//! An `Lsn` names a position in the journal: the segment file number and the
//! byte offset (plus one) of an entry inside that file. LSNs are minted once per
//! append, increase monotonically within a session and are never mutated.
//!
//! ## Ordering
//!
//! ```text
//! LSN_INVALID < every other LSN
//! (s1, o1) < (s2, o2)  iff  s1 < s2  ||  (s1 == s2 && o1 < o2)
//! ```
//!
//! The segment dominates the offset: `(1, i64::MAX) < (2, i64::MIN)`. There is
//! no wraparound handling; exhausting segment numbers is an operational limit
//! reported by the journal, not something comparison tries to paper over.
//!
//! ## Persistence
//!
//! `Lsn::encode` produces a fixed 10-byte little-endian record
//! (`segment: i16`, `offset: i64`) that decodes back to an equal value.

use std::cmp::Ordering;
use std::fmt;

use zerocopy::little_endian::{I16, I64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Encoded size of an LSN.
pub const LSN_ENCODED_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lsn {
    segment: i16,
    offset: i64,
}

/// The distinguished "no position" value.
pub const LSN_INVALID: Lsn = Lsn {
    segment: -1,
    offset: -1,
};

impl Lsn {
    pub const INVALID: Lsn = LSN_INVALID;

    pub const fn new(segment: i16, offset: i64) -> Self {
        Self { segment, offset }
    }

    pub fn segment(&self) -> i16 {
        self.segment
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// False only for `LSN_INVALID`; other negative pairs are valid values.
    pub fn is_valid(&self) -> bool {
        *self != LSN_INVALID
    }

    pub fn encode(&self) -> [u8; LSN_ENCODED_SIZE] {
        let raw = LsnBytes {
            segment: I16::new(self.segment),
            offset: I64::new(self.offset),
        };
        let mut out = [0u8; LSN_ENCODED_SIZE];
        out.copy_from_slice(raw.as_bytes());
        out
    }

    /// Decodes an LSN from the first `LSN_ENCODED_SIZE` bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let raw = LsnBytes::ref_from_bytes(bytes.get(..LSN_ENCODED_SIZE)?).ok()?;
        Some(Self::new(raw.segment.get(), raw.offset.get()))
    }
}

impl Default for Lsn {
    fn default() -> Self {
        LSN_INVALID
    }
}

impl Ord for Lsn {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => Ordering::Equal,
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            (true, true) => self
                .segment
                .cmp(&other.segment)
                .then_with(|| self.offset.cmp(&other.offset)),
        }
    }
}

impl PartialOrd for Lsn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}:{}", self.segment, self.offset)
        } else {
            f.write_str("invalid")
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct LsnBytes {
    segment: I16,
    offset: I64,
}

const _: () = assert!(std::mem::size_of::<LsnBytes>() == LSN_ENCODED_SIZE);

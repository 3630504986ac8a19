//! Fuzz testing for the journal entry decoder.
//!
//! Recovery reads whatever a crash left on disk, so `decode_entry` must
//! reject arbitrary bytes without panicking. Entries that do decode must
//! re-encode to the exact bytes they were read from.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use arbordb::storage::journal::{decode_entry, encode_entry, DecodeError};
use arbordb::JournalRecord;

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(Vec<u8>),
    /// A valid entry with one byte flipped and an optional truncation.
    Mutated {
        txn_id: u64,
        code: u8,
        payload: Vec<u8>,
        flip: usize,
        truncate: Option<usize>,
    },
}

fuzz_target!(|input: Input| {
    match input {
        Input::Raw(bytes) => {
            if let Ok((record, len)) = decode_entry(&bytes) {
                let mut out = Vec::new();
                let written = encode_entry(&record, &mut out).expect("decoded entry re-encodes");
                assert_eq!(written, len);
                assert_eq!(&out[..], &bytes[..len]);
            }
        }
        Input::Mutated {
            txn_id,
            code,
            payload,
            flip,
            truncate,
        } => {
            let record = JournalRecord::operation(code, txn_id, payload);
            let mut bytes = Vec::new();
            if encode_entry(&record, &mut bytes).is_err() {
                return;
            }

            let index = flip % bytes.len();
            bytes[index] ^= 0x01;
            if let Some(cut) = truncate {
                bytes.truncate(cut % (bytes.len() + 1));
            }

            match decode_entry(&bytes) {
                Ok((decoded, _)) => assert_ne!(decoded, record),
                Err(DecodeError::Incomplete { .. }) | Err(DecodeError::Corrupt(_)) => {}
            }
        }
    }
});

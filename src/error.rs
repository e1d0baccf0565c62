//! Error types for the journal codec.
//!
//! This module defines the unified error enum used throughout the crate. All
//! fallible operations return `Result<T, Error>`. The segment reader that
//! drives recovery maps `BadRecordTail` to its truncate-at-last-good-record
//! policy; a clean end-of-stream during recovery is *not* an error (it is
//! reported as [`crate::DecodeOutcome::Incomplete`]).

use std::fmt;

/// Unified error type for all journal codec operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A hard stream error occurred while reading a record during recovery.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record tail failed validation against its header: the journal is
    /// corrupt at this record.
    ///
    /// `expected` and `actual` are the two values of the mismatched field,
    /// widened to `u64` (the 32-bit fields, magic and checksum, occupy the
    /// low half).
    #[error("bad record tail ({field}): expected {expected:#x}; found {actual:#x}")]
    BadRecordTail {
        /// Which tail field mismatched.
        field: TailField,
        /// Value computed from the header (or the CRC of the record body).
        expected: u64,
        /// Value actually found in the tail on disk.
        actual: u64,
    },

    /// A recovery-side buffer could not be allocated.
    #[error("allocation of {bytes} byte {buffer} buffer failed during recovery")]
    BufferAlloc {
        /// Name of the buffer that failed to allocate (`"xid"` or `"payload"`).
        buffer: &'static str,
        /// Requested allocation size in bytes.
        bytes: u64,
    },
}

/// The tail field that failed validation, in check order: the magic
/// complement is checked first, then the serial mirror, then the record-id
/// mirror, then the body checksum. The first mismatch wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailField {
    /// `xmagic` is not the bitwise complement of the header magic.
    Magic,
    /// Tail serial does not mirror the header serial.
    Serial,
    /// Tail record id does not mirror the header record id.
    RecordId,
    /// Stored checksum does not match the checksum of the record body.
    Checksum,
}

impl fmt::Display for TailField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TailField::Magic => "magic",
            TailField::Serial => "serial",
            TailField::RecordId => "record id",
            TailField::Checksum => "checksum",
        };
        f.write_str(name)
    }
}

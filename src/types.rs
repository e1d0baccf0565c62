//! Fixed-width record structures of the journal wire format.
//!
//! An enqueue record on disk is `[header | xid | payload? | tail]`, padded
//! to a whole number of disk blocks. The first 24 bytes of every record
//! kind share one shape -- the [`RecordPrefix`] -- which the segment
//! scanner reads to dispatch on the magic before handing the stream to the
//! per-kind codec. The enqueue header extends the prefix with the two
//! variable-section lengths, and the tail mirrors the prefix's identity
//! fields so a scanner can validate a record boundary without seeking back
//! to the header.
//!
//! All multi-byte fields are serialized little-endian at fixed offsets.

use bytes::{Buf, BufMut};

use crate::error::{Error, TailField};
use crate::layout::{ENQ_MAGIC, JRNL_VERSION};

/// Flag bit: the payload need not survive a broker restart.
const FLAG_TRANSIENT: u16 = 0x0001;

/// Flag bit: the payload lives outside the journal; only its length and the
/// xid are journaled.
const FLAG_EXTERNAL: u16 = 0x0002;

/// The fixed 24-byte prefix shared by every record kind.
///
/// On-disk layout:
///
/// - `magic`: 4 bytes at offset 0
/// - `version`: 1 byte at offset 4
/// - reserved zero byte at offset 5
/// - `flags`: 2 bytes at offset 6
/// - `serial`: 8 bytes at offset 8
/// - `rid`: 8 bytes at offset 16
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPrefix {
    /// Record-kind tag (for enqueue records, [`ENQ_MAGIC`]).
    pub magic: u32,
    /// On-disk format version.
    pub version: u8,
    /// Flag bitfield. Not public: read through the predicates.
    flags: u16,
    /// Epoch/segment serial of the record.
    pub serial: u64,
    /// Monotonically assigned record identifier.
    pub rid: u64,
}

impl RecordPrefix {
    /// Serialized size in bytes.
    pub const SIZE: usize = 24;

    /// Create a prefix with the given identity and zeroed flags.
    pub fn new(magic: u32, version: u8, serial: u64, rid: u64) -> RecordPrefix {
        RecordPrefix {
            magic,
            version,
            flags: 0,
            serial,
            rid,
        }
    }

    /// True if the record's payload is marked transient.
    pub fn is_transient(&self) -> bool {
        self.flags & FLAG_TRANSIENT != 0
    }

    /// True if the record's payload is stored outside the journal.
    pub fn is_external(&self) -> bool {
        self.flags & FLAG_EXTERNAL != 0
    }

    pub(crate) fn set_transient(&mut self, transient: bool) {
        if transient {
            self.flags |= FLAG_TRANSIENT;
        } else {
            self.flags &= !FLAG_TRANSIENT;
        }
    }

    pub(crate) fn set_external(&mut self, external: bool) {
        if external {
            self.flags |= FLAG_EXTERNAL;
        } else {
            self.flags &= !FLAG_EXTERNAL;
        }
    }

    /// Serialize to the fixed 24-byte wire form.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.magic);
        buf.put_u8(self.version);
        buf.put_u8(0);
        buf.put_u16_le(self.flags);
        buf.put_u64_le(self.serial);
        buf.put_u64_le(self.rid);
        out
    }

    /// Deserialize from the fixed 24-byte wire form.
    ///
    /// The prefix carries no self-validation; the segment scanner decides
    /// what to do with an unknown magic.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> RecordPrefix {
        let mut buf = &raw[..];
        let magic = buf.get_u32_le();
        let version = buf.get_u8();
        buf.advance(1);
        let flags = buf.get_u16_le();
        let serial = buf.get_u64_le();
        let rid = buf.get_u64_le();
        RecordPrefix {
            magic,
            version,
            flags,
            serial,
            rid,
        }
    }
}

/// The fixed 40-byte header of an enqueue record: the common prefix plus
/// the lengths of the two variable sections.
///
/// On-disk layout: the [`RecordPrefix`] at offset 0, `xid_size` (8 bytes)
/// at offset 24, `data_size` (8 bytes) at offset 32. The header always fits
/// in the first disk block of a record and is never split across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueHeader {
    /// Common record prefix (magic, version, flags, serial, rid).
    pub prefix: RecordPrefix,
    /// Length of the transaction-id blob in bytes. May be 0.
    pub xid_size: u64,
    /// Logical length of the message payload in bytes. May be 0. For an
    /// external payload this is bookkeeping only; the bytes are not stored.
    pub data_size: u64,
}

impl EnqueueHeader {
    /// Serialized size in bytes.
    pub const SIZE: usize = RecordPrefix::SIZE + 16;

    /// Create an enqueue header with the current magic and format version.
    pub fn new(
        serial: u64,
        rid: u64,
        xid_size: u64,
        data_size: u64,
        transient: bool,
        external: bool,
    ) -> EnqueueHeader {
        let mut prefix = RecordPrefix::new(ENQ_MAGIC, JRNL_VERSION, serial, rid);
        prefix.set_transient(transient);
        prefix.set_external(external);
        EnqueueHeader {
            prefix,
            xid_size,
            data_size,
        }
    }

    /// True if the record's payload is marked transient.
    pub fn is_transient(&self) -> bool {
        self.prefix.is_transient()
    }

    /// True if the record's payload is stored outside the journal.
    pub fn is_external(&self) -> bool {
        self.prefix.is_external()
    }

    /// Serialize to the fixed 40-byte wire form.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..RecordPrefix::SIZE].copy_from_slice(&self.prefix.to_bytes());
        let mut buf = &mut out[RecordPrefix::SIZE..];
        buf.put_u64_le(self.xid_size);
        buf.put_u64_le(self.data_size);
        out
    }

    /// Deserialize from the fixed 40-byte wire form.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> EnqueueHeader {
        let prefix_raw: &[u8; RecordPrefix::SIZE] = raw[..RecordPrefix::SIZE]
            .try_into()
            .expect("slice is exactly 24 bytes");
        let prefix = RecordPrefix::from_bytes(prefix_raw);
        let mut buf = &raw[RecordPrefix::SIZE..];
        let xid_size = buf.get_u64_le();
        let data_size = buf.get_u64_le();
        EnqueueHeader {
            prefix,
            xid_size,
            data_size,
        }
    }
}

/// The fixed 24-byte record tail.
///
/// The tail closes a record with a boundary sentinel (`xmagic`, the bitwise
/// complement of the header magic), a CRC32 over the record body (the xid
/// and stored-payload bytes between header and tail), and mirrors of the
/// header's `serial` and `rid`.
///
/// On-disk layout: `xmagic` (4 bytes) at offset 0, `checksum` (4 bytes) at
/// offset 4, `serial` (8 bytes) at offset 8, `rid` (8 bytes) at offset 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTail {
    /// Bitwise complement of the header magic.
    pub xmagic: u32,
    /// CRC32 of the record body.
    pub checksum: u32,
    /// Mirror of the header serial.
    pub serial: u64,
    /// Mirror of the header rid.
    pub rid: u64,
}

impl RecordTail {
    /// Serialized size in bytes.
    pub const SIZE: usize = 24;

    /// Build the tail for a record with the given prefix and body checksum.
    pub fn for_prefix(prefix: &RecordPrefix, checksum: u32) -> RecordTail {
        RecordTail {
            xmagic: !prefix.magic,
            checksum,
            serial: prefix.serial,
            rid: prefix.rid,
        }
    }

    /// Serialize to the fixed 24-byte wire form.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.xmagic);
        buf.put_u32_le(self.checksum);
        buf.put_u64_le(self.serial);
        buf.put_u64_le(self.rid);
        out
    }

    /// Deserialize from the fixed 24-byte wire form.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> RecordTail {
        let mut buf = &raw[..];
        let xmagic = buf.get_u32_le();
        let checksum = buf.get_u32_le();
        let serial = buf.get_u64_le();
        let rid = buf.get_u64_le();
        RecordTail {
            xmagic,
            checksum,
            serial,
            rid,
        }
    }

    /// Validate this tail against the record's header and the checksum
    /// computed over the record body.
    ///
    /// Checks run in a fixed order -- magic complement, serial mirror, rid
    /// mirror, checksum -- and the first mismatch is reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRecordTail`] naming the mismatched field with
    /// the expected and found values.
    pub fn verify(&self, prefix: &RecordPrefix, checksum: u32) -> Result<(), Error> {
        if self.xmagic != !prefix.magic {
            return Err(Error::BadRecordTail {
                field: TailField::Magic,
                expected: u64::from(!prefix.magic),
                actual: u64::from(self.xmagic),
            });
        }
        if self.serial != prefix.serial {
            return Err(Error::BadRecordTail {
                field: TailField::Serial,
                expected: prefix.serial,
                actual: self.serial,
            });
        }
        if self.rid != prefix.rid {
            return Err(Error::BadRecordTail {
                field: TailField::RecordId,
                expected: prefix.rid,
                actual: self.rid,
            });
        }
        if self.checksum != checksum {
            return Err(Error::BadRecordTail {
                field: TailField::Checksum,
                expected: u64::from(checksum),
                actual: u64::from(self.checksum),
            });
        }
        Ok(())
    }
}

//! On-disk layout constants and block arithmetic for the queue journal.
//!
//! A journal segment is a sequence of fixed-size disk blocks. Every record
//! starts on a block boundary and occupies a whole number of blocks; the gap
//! between a record's last byte and the next block boundary is padding. All
//! page-placement arithmetic in the codec is done in units of
//! [`DBLK_SIZE_BYTES`].

use crate::types::{EnqueueHeader, RecordTail};

/// Size of one disk block in bytes.
pub const DBLK_SIZE_BYTES: usize = 128;

/// Magic tag identifying an enqueue record (ASCII `DQEN`).
pub const ENQ_MAGIC: u32 = u32::from_le_bytes(*b"DQEN");

/// Current on-disk format version.
pub const JRNL_VERSION: u8 = 2;

/// Byte used to fill record padding when the `clean-padding` feature is
/// enabled. Padding content is never validated; the fill only makes stray
/// writes visible in hex dumps.
pub const CLEAN_FILL: u8 = 0xA5;

/// Number of disk blocks needed to hold `nbytes` bytes.
///
/// Zero bytes occupy zero blocks.
pub fn size_dblks(nbytes: usize) -> u32 {
    nbytes.div_ceil(DBLK_SIZE_BYTES) as u32
}

/// Total on-disk byte size of an enqueue record, padding excluded.
///
/// An external payload is not stored in the journal, so its bytes do not
/// count toward the record size; only the xid and the fixed header and tail
/// do.
pub fn rec_size(xid_size: u64, data_size: u64, external: bool) -> usize {
    let data = if external { 0 } else { data_size as usize };
    EnqueueHeader::SIZE + xid_size as usize + data + RecordTail::SIZE
}

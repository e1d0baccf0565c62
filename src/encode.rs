//! Encode side of the enqueue-record codec.
//!
//! [`EnqueueRecord`] binds one enqueue to caller-owned xid and payload
//! buffers and writes the record into journal page buffers. When the page
//! a record lands in does not have enough free blocks, the encoder writes
//! what fits and the journal re-invokes it on the next page with the block
//! offset reached so far; the record is laid down as if the pages were one
//! contiguous region.
//!
//! The record borrows its buffers for its whole lifetime, which is exactly
//! the ownership contract the journal needs: the caller cannot free or
//! mutate the xid or payload while continuation encodes are still possible.

use std::fmt;

use crate::layout::{rec_size, size_dblks, DBLK_SIZE_BYTES};
use crate::types::{EnqueueHeader, RecordTail};

/// An enqueue record bound to caller-owned buffers, ready to encode.
///
/// Construction computes the body checksum once; `encode` may then be
/// invoked any number of times (once per page the record spans) without
/// re-hashing. Re-binding to different buffers is constructing a new value.
#[derive(Debug, Clone, Copy)]
pub struct EnqueueRecord<'a> {
    header: EnqueueHeader,
    tail: RecordTail,
    xid: &'a [u8],
    data: &'a [u8],
}

impl<'a> EnqueueRecord<'a> {
    /// Bind a record to the message and transaction buffers of one enqueue.
    ///
    /// # Arguments
    ///
    /// * `serial` - Epoch/segment serial to stamp the record with.
    /// * `rid` - Record identifier assigned by the journal.
    /// * `data` - Message payload. With `external`, only its length is
    ///   journaled; the bytes themselves are not written.
    /// * `xid` - Transaction-id blob, or `None` for a non-transactional
    ///   enqueue.
    /// * `transient` - The payload need not survive a broker restart.
    /// * `external` - The payload lives outside the journal.
    pub fn new(
        serial: u64,
        rid: u64,
        data: &'a [u8],
        xid: Option<&'a [u8]>,
        transient: bool,
        external: bool,
    ) -> EnqueueRecord<'a> {
        let xid = xid.unwrap_or(&[]);
        let header = EnqueueHeader::new(
            serial,
            rid,
            xid.len() as u64,
            data.len() as u64,
            transient,
            external,
        );

        // Body checksum: the bytes that will sit between header and tail.
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(xid);
        if !external {
            hasher.update(data);
        }
        let tail = RecordTail::for_prefix(&header.prefix, hasher.finalize());

        EnqueueRecord {
            header,
            tail,
            xid,
            data,
        }
    }

    /// The record's header as it will appear on disk.
    pub fn header(&self) -> &EnqueueHeader {
        &self.header
    }

    /// The record's tail as it will appear on disk.
    pub fn tail(&self) -> &RecordTail {
        &self.tail
    }

    /// Total on-disk byte size of the record, padding excluded.
    pub fn rec_size(&self) -> usize {
        rec_size(
            self.header.xid_size,
            self.header.data_size,
            self.header.is_external(),
        )
    }

    /// Number of disk blocks the record occupies on disk.
    pub fn rec_size_dblks(&self) -> u32 {
        size_dblks(self.rec_size())
    }

    /// Write the record, or the next piece of it, into a page buffer.
    ///
    /// The record is the logical byte sequence `[header | xid | payload? |
    /// tail]`; this walks that sequence starting `rec_offs_dblks` blocks in
    /// and copies as much as the page budget holds. The header always fits
    /// in the first block and is never split. When the record completes
    /// within this invocation and the `clean-padding` feature is enabled,
    /// the rest of the final block span is filled with
    /// [`crate::layout::CLEAN_FILL`].
    ///
    /// # Arguments
    ///
    /// * `buf` - Page buffer; must hold at least `max_size_dblks` blocks.
    /// * `rec_offs_dblks` - Blocks of this record already written by prior
    ///   invocations. Zero on the first call. Continuations must be issued
    ///   in strictly increasing order, advancing by each invocation's
    ///   return value.
    /// * `max_size_dblks` - Block budget available in `buf`. Must be > 0.
    ///
    /// # Returns
    ///
    /// The number of disk blocks consumed in `buf`, i.e. the bytes written
    /// this invocation rounded up to whole blocks. If `rec_offs_dblks +
    /// returned < rec_size_dblks()`, the record is not finished and the
    /// caller re-invokes on the next page.
    ///
    /// # Panics
    ///
    /// Panics if `max_size_dblks` is zero or `buf` is shorter than the
    /// stated block budget.
    pub fn encode(&self, buf: &mut [u8], rec_offs_dblks: u32, max_size_dblks: u32) -> u32 {
        assert!(max_size_dblks > 0, "page budget must be at least one block");
        let budget = max_size_dblks as usize * DBLK_SIZE_BYTES;
        assert!(
            buf.len() >= budget,
            "page buffer ({} bytes) shorter than its block budget ({} bytes)",
            buf.len(),
            budget
        );

        let header_bytes = self.header.to_bytes();
        let tail_bytes = self.tail.to_bytes();
        let stored_data: &[u8] = if self.header.is_external() {
            &[]
        } else {
            self.data
        };
        let segments: [&[u8]; 4] = [&header_bytes, self.xid, stored_data, &tail_bytes];

        // Resume position within the logical record. Prior invocations
        // always exhaust their budget, so the consumed prefix is
        // block-aligned and this is exact.
        let mut skip = rec_offs_dblks as usize * DBLK_SIZE_BYTES;
        let mut rem = budget;
        let mut wr_cnt = 0usize;

        for segment in segments {
            let seg_skip = skip.min(segment.len());
            skip -= seg_skip;
            let pending = &segment[seg_skip..];
            if pending.is_empty() {
                continue;
            }
            if rem == 0 {
                break;
            }
            let wsize = pending.len().min(rem);
            buf[wr_cnt..wr_cnt + wsize].copy_from_slice(&pending[..wsize]);
            wr_cnt += wsize;
            rem -= wsize;
        }

        let complete = rec_offs_dblks as usize * DBLK_SIZE_BYTES + wr_cnt == self.rec_size();
        if complete {
            #[cfg(feature = "clean-padding")]
            {
                let span = size_dblks(wr_cnt) as usize * DBLK_SIZE_BYTES;
                buf[wr_cnt..span].fill(crate::layout::CLEAN_FILL);
            }
        } else {
            debug_assert_eq!(rem, 0, "non-terminal encode must exhaust its page budget");
        }

        size_dblks(wr_cnt)
    }
}

impl fmt::Display for EnqueueRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enq_rec: m={:#x} v={} rid={}",
            self.header.prefix.magic, self.header.prefix.version, self.header.prefix.rid
        )?;
        if !self.xid.is_empty() {
            write!(f, " xid=\"")?;
            for byte in self.xid {
                write!(f, "{byte:02x}")?;
            }
            write!(f, "\"")?;
        }
        write!(f, " len={}", self.header.data_size)
    }
}

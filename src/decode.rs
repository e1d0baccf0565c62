//! Decode side of the enqueue-record codec: incremental recovery of
//! enqueue records from a segment byte stream.
//!
//! The journal's segment scanner reads the fixed 24-byte prefix of every
//! record to dispatch by magic, then hands the stream to this module.
//! [`RecoveredRecord::decode`] reads the rest of the record, tracking its
//! progress in a caller-held byte watermark. A stream that ends cleanly
//! mid-record is normal during recovery -- the segment file may simply not
//! have grown yet -- so that case is the [`DecodeOutcome::Incomplete`]
//! value, not an error, and the same invocation can be retried once more
//! bytes exist. Corruption, by contrast, is detected at the record tail
//! and reported as [`Error::BadRecordTail`].
//!
//! Unlike the encode side, a recovered record owns what it reads: the xid
//! (and the payload, when capture is requested) live in buffers allocated
//! here and released when the record is dropped.

use std::fmt;
use std::io::{self, Read};

use bytes::Buf;

use crate::error::Error;
use crate::layout::{rec_size, size_dblks, DBLK_SIZE_BYTES};
use crate::types::{EnqueueHeader, RecordPrefix, RecordTail};

/// Result of one decode invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The record was fully read and its tail validated; the stream is
    /// positioned on the next record's block boundary.
    Complete,
    /// The stream ended cleanly before the record did. The watermark
    /// reflects the bytes consumed; retry after the segment grows.
    Incomplete,
}

/// Chunk size for consuming payload bytes that are checksummed but not
/// materialized.
const SKIP_CHUNK: usize = 4096;

/// Bytes of the enqueue header that follow the common prefix (the two
/// section-length fields).
const SIZE_FIELDS: usize = EnqueueHeader::SIZE - RecordPrefix::SIZE;

/// An enqueue record being reassembled from a segment stream.
///
/// Create one per record with [`RecoveredRecord::new`] (payload consumed
/// but not kept) or [`RecoveredRecord::with_payload_capture`] (payload
/// materialized into an owned buffer), then call [`decode`] until it
/// returns [`DecodeOutcome::Complete`].
///
/// [`decode`]: RecoveredRecord::decode
pub struct RecoveredRecord {
    header: EnqueueHeader,
    tail: RecordTail,
    /// Staging for the two size fields; a stream can be cut mid-field.
    size_buf: [u8; SIZE_FIELDS],
    /// Staging for the tail, filled at byte granularity across resumes.
    tail_buf: [u8; RecordTail::SIZE],
    xid: Vec<u8>,
    payload: Vec<u8>,
    capture_payload: bool,
    /// Running CRC32 of the record body, fed as bytes arrive.
    hasher: crc32fast::Hasher,
}

impl RecoveredRecord {
    /// Create an empty record whose payload bytes will be consumed and
    /// checksummed but not kept.
    pub fn new() -> RecoveredRecord {
        RecoveredRecord {
            header: EnqueueHeader::new(0, 0, 0, 0, false, false),
            tail: RecordTail::for_prefix(&EnqueueHeader::new(0, 0, 0, 0, false, false).prefix, 0),
            size_buf: [0u8; SIZE_FIELDS],
            tail_buf: [0u8; RecordTail::SIZE],
            xid: Vec::new(),
            payload: Vec::new(),
            capture_payload: false,
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Create an empty record that additionally materializes the payload
    /// into an owned buffer, retrievable through [`data`] after a complete
    /// decode.
    ///
    /// [`data`]: RecoveredRecord::data
    pub fn with_payload_capture() -> RecoveredRecord {
        RecoveredRecord {
            capture_payload: true,
            ..RecoveredRecord::new()
        }
    }

    /// The record header as reassembled from the stream.
    pub fn header(&self) -> &EnqueueHeader {
        &self.header
    }

    /// The transaction-id blob, or `None` for a non-transactional record.
    pub fn xid(&self) -> Option<&[u8]> {
        if self.header.xid_size == 0 {
            None
        } else {
            Some(&self.xid)
        }
    }

    /// The logical payload length in bytes, external or not.
    pub fn data_size(&self) -> u64 {
        self.header.data_size
    }

    /// The payload bytes, if they were stored in the journal and this
    /// record was created with payload capture. For an external payload
    /// this is always `None`; [`data_size`] still reports the length.
    ///
    /// [`data_size`]: RecoveredRecord::data_size
    pub fn data(&self) -> Option<&[u8]> {
        if self.capture_payload && !self.header.is_external() {
            Some(&self.payload)
        } else {
            None
        }
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

    /// Read the record, or as much of it as the stream holds, advancing
    /// the byte watermark.
    ///
    /// On the first invocation (`*rec_offs == 0`) the record adopts the
    /// prefix the segment scanner already consumed, then reads the two
    /// section lengths, the xid, the stored payload (skipped or captured),
    /// and the tail; `*rec_offs` counts consumed record bytes, prefix
    /// included. Each subsequent invocation resumes at the watermark, so a
    /// record split by end-of-file is finished by calling `decode` again
    /// on the grown stream with the same watermark variable.
    ///
    /// On completion the block padding after the tail is consumed, leaving
    /// the stream on the next record's boundary, and the tail is validated
    /// against the header and the body checksum.
    ///
    /// # Arguments
    ///
    /// * `prefix` - The 24-byte record prefix read by the segment scanner.
    ///   Only consulted on the first invocation.
    /// * `reader` - The segment stream, positioned at the watermark.
    /// * `rec_offs` - In/out byte watermark; `0` on the first invocation.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] on a hard stream error, [`Error::BufferAlloc`] if an
    /// owned buffer cannot be allocated, [`Error::BadRecordTail`] if the
    /// completed record fails tail validation.
    pub fn decode<R: Read>(
        &mut self,
        prefix: RecordPrefix,
        reader: &mut R,
        rec_offs: &mut u64,
    ) -> Result<DecodeOutcome, Error> {
        let prefix_end = RecordPrefix::SIZE as u64;
        let header_end = EnqueueHeader::SIZE as u64;

        if *rec_offs == 0 {
            self.header.prefix = prefix;
            self.hasher = crc32fast::Hasher::new();
            self.xid.clear();
            self.payload.clear();
            *rec_offs = prefix_end;
        }

        if *rec_offs < header_end {
            let offs = (*rec_offs - prefix_end) as usize;
            let got = read_full(reader, &mut self.size_buf[offs..])?;
            *rec_offs += got as u64;
            if *rec_offs < header_end {
                tracing::debug!(
                    rec_offs = *rec_offs,
                    "stream ended inside enqueue header size fields"
                );
                return Ok(DecodeOutcome::Incomplete);
            }
            let mut buf = &self.size_buf[..];
            self.header.xid_size = buf.get_u64_le();
            self.header.data_size = buf.get_u64_le();
            if self.header.xid_size > 0 {
                reserve_exact(&mut self.xid, self.header.xid_size, "xid")?;
                self.xid.resize(self.header.xid_size as usize, 0);
            }
        }

        let xid_end = header_end + self.header.xid_size;
        let stored_data = if self.header.is_external() {
            0
        } else {
            self.header.data_size
        };
        let data_end = xid_end + stored_data;
        let tail_end = data_end + RecordTail::SIZE as u64;

        if *rec_offs < xid_end {
            let offs = (*rec_offs - header_end) as usize;
            let got = read_full(reader, &mut self.xid[offs..])?;
            self.hasher.update(&self.xid[offs..offs + got]);
            *rec_offs += got as u64;
            if *rec_offs < xid_end {
                tracing::debug!(rec_offs = *rec_offs, "stream ended inside xid");
                return Ok(DecodeOutcome::Incomplete);
            }
        }

        if *rec_offs < data_end {
            if self.capture_payload {
                if self.payload.is_empty() {
                    reserve_exact(&mut self.payload, stored_data, "payload")?;
                    self.payload.resize(stored_data as usize, 0);
                }
                let offs = (*rec_offs - xid_end) as usize;
                let got = read_full(reader, &mut self.payload[offs..])?;
                self.hasher.update(&self.payload[offs..offs + got]);
                *rec_offs += got as u64;
            } else {
                // Consume without materializing; the checksum still covers
                // every payload byte.
                let mut scratch = [0u8; SKIP_CHUNK];
                while *rec_offs < data_end {
                    let want = ((data_end - *rec_offs) as usize).min(SKIP_CHUNK);
                    let got = read_full(reader, &mut scratch[..want])?;
                    self.hasher.update(&scratch[..got]);
                    *rec_offs += got as u64;
                    if got < want {
                        break;
                    }
                }
            }
            if *rec_offs < data_end {
                tracing::debug!(rec_offs = *rec_offs, "stream ended inside payload");
                return Ok(DecodeOutcome::Incomplete);
            }
        }

        if *rec_offs < tail_end {
            let offs = (*rec_offs - data_end) as usize;
            let got = read_full(reader, &mut self.tail_buf[offs..])?;
            *rec_offs += got as u64;
            if *rec_offs < tail_end {
                tracing::debug!(rec_offs = *rec_offs, "stream ended inside record tail");
                return Ok(DecodeOutcome::Incomplete);
            }
            self.tail = RecordTail::from_bytes(&self.tail_buf);
        }

        // Leave the stream on the next record's block boundary. Hitting
        // end-of-file inside the padding is fine; padding carries no data.
        let padding = self.rec_size_dblks() as usize * DBLK_SIZE_BYTES - self.rec_size();
        skip(reader, padding)?;

        let checksum = self.hasher.clone().finalize();
        if let Err(err) = self.tail.verify(&self.header.prefix, checksum) {
            tracing::warn!(
                serial = self.header.prefix.serial,
                rid = self.header.prefix.rid,
                %err,
                "enqueue record failed tail validation"
            );
            return Err(err);
        }
        Ok(DecodeOutcome::Complete)
    }
}

impl Default for RecoveredRecord {
    fn default() -> RecoveredRecord {
        RecoveredRecord::new()
    }
}

impl fmt::Display for RecoveredRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enq_rec: m={:#x} v={} rid={}",
            self.header.prefix.magic, self.header.prefix.version, self.header.prefix.rid
        )?;
        if self.header.xid_size > 0 {
            write!(f, " xid=\"")?;
            for byte in &self.xid {
                write!(f, "{byte:02x}")?;
            }
            write!(f, "\"")?;
        }
        write!(f, " len={}", self.header.data_size)
    }
}

/// Fill `buf` from the reader, retrying short reads, until it is full or
/// the stream ends. Returns the number of bytes read; a short count means
/// end-of-stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Consume and discard up to `n` bytes. End-of-stream short counts are
/// tolerated; only hard errors propagate.
fn skip<R: Read>(reader: &mut R, n: usize) -> io::Result<()> {
    let mut scratch = [0u8; SKIP_CHUNK];
    let mut remaining = n;
    while remaining > 0 {
        let want = remaining.min(SKIP_CHUNK);
        let got = read_full(reader, &mut scratch[..want])?;
        if got == 0 {
            break;
        }
        remaining -= got;
    }
    Ok(())
}

/// Reserve exactly `bytes` of capacity, mapping allocation failure to the
/// structured codec error instead of aborting.
fn reserve_exact(buf: &mut Vec<u8>, bytes: u64, name: &'static str) -> Result<(), Error> {
    let want = usize::try_from(bytes).unwrap_or(usize::MAX);
    buf.try_reserve_exact(want).map_err(|_| Error::BufferAlloc {
        buffer: name,
        bytes,
    })
}

//! duraq-journal: the enqueue-record codec of the DuraQ broker's queue
//! journal.
//!
//! The journal is a linear, append-only log of fixed-size disk blocks.
//! Every message enqueued onto a durable queue is serialized as a
//! self-describing, self-validating record: a fixed header, the
//! transaction-id blob, the payload (unless it lives outside the journal),
//! and a tail that mirrors the header's identity fields and carries a CRC32
//! of the body. Records are padded to whole blocks.
//!
//! This crate is the codec only. [`EnqueueRecord`] encodes a record into
//! journal page buffers, splitting across pages when a page runs out of
//! blocks; [`RecoveredRecord`] reassembles a record incrementally from a
//! segment byte stream during recovery, tolerating streams that end
//! mid-record and diagnosing corruption through the tail checks. The
//! segment manager that allocates pages, the queue logic that assigns
//! record ids, and the I/O plane that moves pages to disk are callers, not
//! residents.

pub mod decode;
pub mod encode;
pub mod error;
pub mod layout;
pub mod types;

pub use decode::{DecodeOutcome, RecoveredRecord};
pub use encode::EnqueueRecord;
pub use error::{Error, TailField};
pub use layout::{rec_size, size_dblks, CLEAN_FILL, DBLK_SIZE_BYTES, ENQ_MAGIC, JRNL_VERSION};
pub use types::{EnqueueHeader, RecordPrefix, RecordTail};

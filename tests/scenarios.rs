//! Literal-input scenarios for the enqueue-record codec, driven the way the
//! journal drives it: encode into page buffers, recover from a sequential
//! byte stream.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom, Write};

use duraq_journal::{
    size_dblks, DecodeOutcome, EnqueueHeader, EnqueueRecord, Error, RecordPrefix, RecordTail,
    RecoveredRecord, TailField, DBLK_SIZE_BYTES,
};

/// Encode `record` in one shot into a buffer of exactly its block span.
fn encode_to_vec(record: &EnqueueRecord<'_>) -> Vec<u8> {
    let blocks = record.rec_size_dblks();
    let mut buf = vec![0u8; blocks as usize * DBLK_SIZE_BYTES];
    let written = record.encode(&mut buf, 0, blocks);
    assert_eq!(written, blocks);
    buf
}

/// Read the 24-byte record prefix the way the segment scanner does.
fn read_prefix<R: Read>(reader: &mut R) -> RecordPrefix {
    let mut raw = [0u8; RecordPrefix::SIZE];
    reader.read_exact(&mut raw).expect("record prefix");
    RecordPrefix::from_bytes(&raw)
}

/// Decode one record to completion from the start of `encoded`.
fn decode_complete(encoded: &[u8], capture: bool) -> RecoveredRecord {
    let mut cursor = Cursor::new(encoded);
    let prefix = read_prefix(&mut cursor);
    let mut record = if capture {
        RecoveredRecord::with_payload_capture()
    } else {
        RecoveredRecord::new()
    };
    let mut rec_offs = 0u64;
    let outcome = record
        .decode(prefix, &mut cursor, &mut rec_offs)
        .expect("decode");
    assert_eq!(outcome, DecodeOutcome::Complete);
    record
}

// Scenario 1: minimal record -- no xid, two payload bytes.

#[test]
fn minimal_record_round_trip() {
    let record = EnqueueRecord::new(1, 42, b"hi", None, false, false);

    let mut page = vec![0u8; 4 * DBLK_SIZE_BYTES];
    let written = record.encode(&mut page, 0, 4);
    assert_eq!(
        written,
        size_dblks(EnqueueHeader::SIZE + 2 + RecordTail::SIZE)
    );

    let decoded = decode_complete(&page, false);
    assert_eq!(decoded.xid(), None);
    assert_eq!(decoded.data_size(), 2);
    assert_eq!(decoded.header().prefix.serial, 1);
    assert_eq!(decoded.header().prefix.rid, 42);
}

// Scenario 2: record with an xid -- every field survives the round trip and
// the debug rendering names the record.

#[test]
fn xid_record_round_trip_and_debug_render() {
    let record = EnqueueRecord::new(7, 100, b"payload", Some(b"abc"), false, false);
    let encoded = encode_to_vec(&record);

    let decoded = decode_complete(&encoded, true);
    assert_eq!(decoded.header().prefix.serial, 7);
    assert_eq!(decoded.header().prefix.rid, 100);
    assert!(!decoded.header().is_transient());
    assert!(!decoded.header().is_external());
    assert_eq!(decoded.xid(), Some(&b"abc"[..]));
    assert_eq!(decoded.data(), Some(&b"payload"[..]));

    let rendered = record.to_string();
    assert!(rendered.contains("rid=100"), "got: {rendered}");
    assert!(rendered.contains("len=7"), "got: {rendered}");
    assert_eq!(rendered, decoded.to_string());
}

// Scenario 3: external payload -- bytes absent on disk, length preserved.

#[test]
fn external_record_stores_no_payload_bytes() {
    let record = EnqueueRecord::new(1, 1, b"ignored", Some(b"tx1"), false, true);
    assert_eq!(
        record.rec_size(),
        EnqueueHeader::SIZE + 3 + RecordTail::SIZE
    );

    let encoded = encode_to_vec(&record);
    let decoded = decode_complete(&encoded, true);
    assert_eq!(decoded.data_size(), 7);
    assert_eq!(decoded.data(), None);
    assert_eq!(decoded.xid(), Some(&b"tx1"[..]));
}

// Scenario 4: a 10-block record split across two pages with budgets 4 and 6.

#[test]
fn ten_block_record_split_across_two_pages() {
    let data = vec![0x5Au8; 1200];
    let record = EnqueueRecord::new(3, 9, &data, None, false, false);
    assert_eq!(record.rec_size_dblks(), 10);

    let mut page1 = vec![0u8; 4 * DBLK_SIZE_BYTES];
    let written1 = record.encode(&mut page1, 0, 4);
    assert_eq!(written1, 4);

    let mut page2 = vec![0u8; 6 * DBLK_SIZE_BYTES];
    let written2 = record.encode(&mut page2, written1, 6);
    assert_eq!(written2, 6);

    let mut combined = page1;
    combined.extend_from_slice(&page2);
    let decoded = decode_complete(&combined, true);
    assert_eq!(decoded.data(), Some(&data[..]));
    assert_eq!(decoded.header().prefix.rid, 9);
}

// Scenario 5: truncation mid-xid -- decode reports Incomplete and the
// watermark stops exactly where the stream did.

#[test]
fn truncation_mid_xid_leaves_watermark_at_cut() {
    let xid = vec![0xABu8; 1024];
    let record = EnqueueRecord::new(2, 3, b"body", Some(&xid), false, false);
    let encoded = encode_to_vec(&record);

    // Header plus 100 xid bytes reach the decoder.
    let cut = EnqueueHeader::SIZE + 100;
    let mut cursor = Cursor::new(&encoded[..cut]);
    let prefix = read_prefix(&mut cursor);

    let mut recovered = RecoveredRecord::new();
    let mut rec_offs = 0u64;
    let outcome = recovered
        .decode(prefix, &mut cursor, &mut rec_offs)
        .expect("truncated decode must not error");
    assert_eq!(outcome, DecodeOutcome::Incomplete);
    assert_eq!(rec_offs as usize, EnqueueHeader::SIZE + 100);

    // Feeding the missing suffix completes the record.
    let mut rest = Cursor::new(&encoded[cut..]);
    let outcome = recovered
        .decode(prefix, &mut rest, &mut rec_offs)
        .expect("resumed decode");
    assert_eq!(outcome, DecodeOutcome::Complete);
    assert_eq!(recovered.xid(), Some(&xid[..]));
}

// Scenario 6: one flipped bit in the tail's rid mirror.

#[test]
fn tail_rid_corruption_is_diagnosed() {
    let record = EnqueueRecord::new(1, 0x64, b"hi", None, false, false);
    let mut encoded = encode_to_vec(&record);
    // The rid mirror is the last 8 bytes of the tail.
    let rid_offs = record.rec_size() - 8;
    encoded[rid_offs] ^= 0x01;

    let mut cursor = Cursor::new(&encoded[..]);
    let prefix = read_prefix(&mut cursor);
    let mut recovered = RecoveredRecord::new();
    let mut rec_offs = 0u64;
    let err = recovered
        .decode(prefix, &mut cursor, &mut rec_offs)
        .expect_err("corrupt tail must fail");

    match &err {
        Error::BadRecordTail {
            field,
            expected,
            actual,
        } => {
            assert_eq!(*field, TailField::RecordId);
            assert_eq!(*expected, 0x64);
            assert_eq!(*actual, 0x65);
        }
        other => panic!("expected BadRecordTail, got: {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("record id"), "got: {msg}");
    assert!(msg.contains("0x64"), "got: {msg}");
    assert!(msg.contains("0x65"), "got: {msg}");
}

// A journal segment on disk: several records appended back to back, then a
// write cut short by a crash. Recovery walks the file, recovers the whole
// records, and reports the torn one as incomplete rather than corrupt.

#[test]
fn file_backed_recovery_walks_records_and_stops_at_torn_tail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("segment.jrnl");

    let payload = vec![0x11u8; 300];
    let records = [
        EnqueueRecord::new(1, 1, b"first", None, false, false),
        EnqueueRecord::new(1, 2, &payload, Some(b"txn-a"), true, false),
        EnqueueRecord::new(1, 3, b"outside", Some(b"txn-b"), false, true),
    ];

    let mut file = File::create(&path).expect("create segment");
    for record in &records {
        file.write_all(&encode_to_vec(record)).expect("append");
    }
    // A fourth record torn mid-write: only its first 50 bytes made it out.
    let torn = EnqueueRecord::new(1, 4, &payload, Some(b"txn-c"), false, false);
    file.write_all(&encode_to_vec(&torn)[..50]).expect("torn append");
    file.sync_all().expect("sync");
    drop(file);

    let file = File::open(&path).expect("open segment");
    let mut reader = BufReader::new(file);

    for expected in &records {
        let prefix = read_prefix(&mut reader);
        let mut recovered = RecoveredRecord::with_payload_capture();
        let mut rec_offs = 0u64;
        let outcome = recovered
            .decode(prefix, &mut reader, &mut rec_offs)
            .expect("decode");
        assert_eq!(outcome, DecodeOutcome::Complete);
        assert_eq!(
            recovered.header().prefix.rid,
            expected.header().prefix.rid
        );
        assert_eq!(recovered.data_size(), expected.header().data_size);
        assert_eq!(rec_offs as usize, expected.rec_size());
    }

    let prefix = read_prefix(&mut reader);
    assert_eq!(prefix.rid, 4);
    let mut recovered = RecoveredRecord::new();
    let mut rec_offs = 0u64;
    let outcome = recovered
        .decode(prefix, &mut reader, &mut rec_offs)
        .expect("torn record must not error");
    assert_eq!(outcome, DecodeOutcome::Incomplete);
    assert_eq!(rec_offs, 50);
}

// The retry path a live recovery takes: the segment grows after an
// Incomplete, and the same record finishes from its watermark.

#[test]
fn file_backed_retry_after_segment_grows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("segment.jrnl");

    let xid = vec![0x77u8; 256];
    let record = EnqueueRecord::new(9, 21, b"grow", Some(&xid), false, false);
    let encoded = encode_to_vec(&record);
    let cut = EnqueueHeader::SIZE + 64;

    std::fs::write(&path, &encoded[..cut]).expect("partial segment");

    let mut reader = BufReader::new(File::open(&path).expect("open"));
    let prefix = read_prefix(&mut reader);
    let mut recovered = RecoveredRecord::new();
    let mut rec_offs = 0u64;
    let outcome = recovered
        .decode(prefix, &mut reader, &mut rec_offs)
        .expect("first pass");
    assert_eq!(outcome, DecodeOutcome::Incomplete);
    drop(reader);

    // The broker appends the rest of the record.
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .expect("reopen for append");
    file.write_all(&encoded[cut..]).expect("append rest");
    file.sync_all().expect("sync");
    drop(file);

    let mut reader = BufReader::new(File::open(&path).expect("reopen"));
    reader
        .seek(SeekFrom::Start(rec_offs))
        .expect("seek to watermark");
    let outcome = recovered
        .decode(prefix, &mut reader, &mut rec_offs)
        .expect("second pass");
    assert_eq!(outcome, DecodeOutcome::Complete);
    assert_eq!(recovered.xid(), Some(&xid[..]));
}

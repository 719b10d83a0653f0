//! Tests for the segment and collection store layer
//!
//! These tests verify:
//! - Object header encode/decode round trips
//! - Segment rollover by item count and by data bytes
//! - END-MARKER placement in segments closed short
//! - Unique/duplicate index split and its finalization invariant
//! - Index rebuild when a version directory is reopened

use frostkv::store::{header_width, CollectionStore, ObjectHeader, Segment};
use frostkv::{FrostError, Item};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Open a store with 2 keys per item, 4 items per segment, 4 KiB segments
fn small_store(dir: &TempDir) -> CollectionStore {
    CollectionStore::open(dir.path(), 2, 4, 4096).unwrap()
}

fn filled(byte: u8, len: usize) -> Vec<u8> {
    vec![byte; len]
}

// =============================================================================
// Object Header Tests
// =============================================================================

#[test]
fn test_header_round_trip_every_key_count() {
    for key_count in 1..=4 {
        let keys: Vec<i64> = (0..key_count as i64).map(|i| i * 31 - 7).collect();
        let header = ObjectHeader::new(1024, 555, keys);

        let mut buf = vec![0u8; header.encoded_len()];
        header.encode_into(&mut buf);

        assert_eq!(buf.len(), 8 + 8 * key_count);
        assert_eq!(ObjectHeader::decode(&buf, key_count), header);
    }
}

#[test]
fn test_header_encoding_is_little_endian() {
    let header = ObjectHeader::new(0x0102_0304, 0x0A0B_0C0D, vec![0x1122_3344_5566_7788]);
    let mut buf = vec![0u8; header.encoded_len()];
    header.encode_into(&mut buf);

    assert_eq!(&buf[0..4], &[0x04, 0x03, 0x02, 0x01]);
    assert_eq!(&buf[4..8], &[0x0D, 0x0C, 0x0B, 0x0A]);
    assert_eq!(
        &buf[8..16],
        &[0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
    );
}

// =============================================================================
// Segment Rollover Tests
// =============================================================================

#[test]
fn test_rollover_by_item_count_leaves_full_tables() {
    let dir = TempDir::new().unwrap();
    let mut store = small_store(&dir);

    // 4 items per segment; 10 items need 3 segments
    for i in 0..10i64 {
        store.store(&Item::new(filled(1, 16), vec![i, 0])).unwrap();
    }
    store.end_of_feed();

    assert_eq!(store.segment_count(), 3);
    assert_eq!(store.totals().object_count, 10);
}

#[test]
fn test_rollover_by_bytes_writes_end_marker() {
    let dir = TempDir::new().unwrap();
    // 1 key, up to 8 items, 16-byte headers: 128-byte table, 872-byte data area
    let mut store = CollectionStore::open(dir.path(), 1, 8, 1000).unwrap();

    store.store(&Item::new(filled(1, 500), vec![1])).unwrap();
    // 372 bytes left; this forces an END-MARKER and a rollover
    store.store(&Item::new(filled(2, 400), vec![2])).unwrap();
    store.end_of_feed();

    assert_eq!(store.segment_count(), 2);

    // The first segment holds one item and was closed short: its second
    // header slot must be the END-MARKER
    let first = Segment::open(&dir.path().join("0001.bin"), 1, 1, 8).unwrap();
    assert_eq!(first.item_count(), 1);
    let raw_slot = {
        let headers = first.headers();
        assert_eq!(headers.len(), 1);
        headers[0].clone()
    };
    assert_eq!(raw_slot.length, 500);

    let second = Segment::open(&dir.path().join("0002.bin"), 2, 1, 8).unwrap();
    assert_eq!(second.item_count(), 1);
    assert_eq!(second.headers()[0].length, 400);
}

#[test]
fn test_segment_files_are_zero_padded_and_ordered() {
    let dir = TempDir::new().unwrap();
    let mut store = small_store(&dir);

    for i in 0..9i64 {
        store.store(&Item::new(filled(0, 8), vec![i, 0])).unwrap();
    }
    store.end_of_feed();

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    assert_eq!(names, vec!["0001.bin", "0002.bin", "0003.bin"]);
}

#[test]
fn test_item_larger_than_data_area_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut store = small_store(&dir);

    // Data area: 4096 - 4 * 24 = 4000 bytes
    let data_area = 4096 - 4 * header_width(2);
    let err = store
        .store(&Item::new(filled(0, data_area + 1), vec![1, 2]))
        .unwrap_err();
    assert!(matches!(err, FrostError::ItemTooLarge { .. }));

    // The boundary itself fits
    store
        .store(&Item::new(filled(0, data_area), vec![1, 2]))
        .unwrap();
}

// =============================================================================
// Index Tests
// =============================================================================

#[test]
fn test_key_coverage_after_feed() {
    let dir = TempDir::new().unwrap();
    let mut store = small_store(&dir);

    // Keys 0, 1, 2, 0, 1, 0: three distinct, two duplicated
    for (i, key) in [0i64, 1, 2, 0, 1, 0].iter().enumerate() {
        store
            .store(&Item::new(filled(i as u8, 10 + i), vec![*key, i as i64]))
            .unwrap();
    }
    let totals = store.end_of_feed();

    assert_eq!(totals.object_count, 6);
    assert_eq!(totals.non_unique_keys, 2);
    assert_eq!(store.distinct_primary_keys(), 3);

    // Every stored item is resolvable through its primary key
    let resolvable: usize = [0i64, 1, 2]
        .iter()
        .map(|k| store.get_by_primary(*k).len())
        .sum();
    assert_eq!(resolvable, 6);
}

#[test]
fn test_duplicates_return_in_insertion_order() {
    let dir = TempDir::new().unwrap();
    let mut store = small_store(&dir);

    store.store(&Item::new(filled(1, 11), vec![5, 0])).unwrap();
    store.store(&Item::new(filled(2, 22), vec![5, 1])).unwrap();
    store.store(&Item::new(filled(3, 33), vec![5, 2])).unwrap();
    store.end_of_feed();

    let hits = store.get_by_primary(5);
    assert_eq!(
        hits.iter().map(|d| d.len()).collect::<Vec<_>>(),
        vec![11, 22, 33]
    );
}

#[test]
fn test_query_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let mut store = small_store(&dir);

    for i in 0..6i64 {
        store
            .store(&Item::new(filled(i as u8, 10), vec![i % 2, i]))
            .unwrap();
    }
    store.end_of_feed();

    let first = store.get_by_primary(0);
    for _ in 0..5 {
        assert_eq!(store.get_by_primary(0), first);
    }
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_spans_segments() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = small_store(&dir);
        // Alternating sizes: 1900+300+1900 exceeds the 4000-byte data area,
        // so segments roll over on bytes before the 4-item cap
        for i in 0..20i64 {
            let len = if i % 2 == 0 { 1900 } else { 300 };
            store
                .store(&Item::new(filled(i as u8, len), vec![i, i + 1]))
                .unwrap();
        }
        store.end_of_feed();
        assert!(store.segment_count() > 1);
    }

    let reopened = small_store(&dir);
    assert_eq!(reopened.totals().object_count, 20);

    assert_eq!(reopened.get_by_primary(0)[0].len(), 1900);
    assert_eq!(reopened.get_by_primary(1)[0].len(), 300);
    // An item that can only live in a later segment is still reachable
    assert_eq!(reopened.get_by_primary(19).len(), 1);
}

#[test]
fn test_reopen_preserves_duplicate_order() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = small_store(&dir);
        for i in 0..6i64 {
            store
                .store(&Item::new(filled(i as u8, 10 + i as usize), vec![9, i]))
                .unwrap();
        }
        store.end_of_feed();
    }

    let reopened = small_store(&dir);
    let hits = reopened.get_by_primary(9);
    assert_eq!(
        hits.iter().map(|d| d.len()).collect::<Vec<_>>(),
        vec![10, 11, 12, 13, 14, 15]
    );
    assert_eq!(reopened.totals().non_unique_keys, 1);
}

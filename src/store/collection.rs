//! Collection store
//!
//! One collection version: its ordered segments and the in-memory
//! primary-key index on top of them.
//!
//! ## Index discipline
//! Two parallel maps are kept: `unique_index` for primary keys observed
//! exactly once and `dup_index` for keys observed more than once. On each
//! store, a key's first occurrence lands in `unique_index`; its second
//! occurrence moves the existing entry into `dup_index` alongside the new
//! one; further occurrences append. `end_of_feed` normalizes the maps so
//! that no key is present in both.
//!
//! Duplicate order is insertion order, which equals sequential scan order
//! when the store is rebuilt from disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FrostError, Result};

use super::segment::{parse_segment_file_name, Segment};
use super::Item;

/// In-memory location of one stored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The document's non-primary keys (`keys[1..]`)
    pub other_keys: Vec<i64>,

    /// Ordinal of the segment holding the document (1-based)
    pub file_index: i32,

    /// Byte offset of the data within the segment file
    pub offset_in_file: i32,

    /// Data length in bytes
    pub length: i32,
}

/// Totals computed when a feed is sealed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionTotals {
    /// Documents stored
    pub object_count: u64,

    /// Primary keys with more than one document
    pub non_unique_keys: u64,

    /// Sum of document data lengths in bytes
    pub total_size_in_bytes: u64,
}

/// One collection version: ordered segments plus the primary-key index
pub struct CollectionStore {
    dir: PathBuf,
    key_count: usize,
    max_items_per_segment: usize,
    segment_capacity: usize,

    /// Segments in chronological order; `file_index` N lives at slot N-1
    segments: Vec<Segment>,

    /// Primary keys observed exactly once
    unique_index: HashMap<i64, IndexEntry>,

    /// Primary keys observed more than once, entries in insertion order
    dup_index: HashMap<i64, Vec<IndexEntry>>,

    object_count: u64,
    total_size_in_bytes: u64,
}

impl CollectionStore {
    /// Open a collection version directory.
    ///
    /// An empty directory yields an empty store ready for feeding; existing
    /// segments are scanned header-by-header to rebuild the finalized index.
    pub fn open(
        dir: &Path,
        key_count: usize,
        max_items_per_segment: usize,
        segment_capacity: usize,
    ) -> Result<Self> {
        let mut indexed: Vec<(i32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(file_index) = parse_segment_file_name(&name.to_string_lossy()) {
                indexed.push((file_index, entry.path()));
            }
        }
        indexed.sort_by_key(|(file_index, _)| *file_index);

        let mut store = Self {
            dir: dir.to_path_buf(),
            key_count,
            max_items_per_segment,
            segment_capacity,
            segments: Vec::new(),
            unique_index: HashMap::new(),
            dup_index: HashMap::new(),
            object_count: 0,
            total_size_in_bytes: 0,
        };

        for (file_index, path) in indexed {
            let segment = Segment::open(&path, file_index, key_count, max_items_per_segment)?;
            for header in segment.headers() {
                let entry = IndexEntry {
                    other_keys: header.index_keys[1..].to_vec(),
                    file_index,
                    offset_in_file: header.offset_in_file,
                    length: header.length,
                };
                store.insert_entry(header.index_keys[0], entry);
                store.object_count += 1;
                store.total_size_in_bytes += header.length as u64;
            }
            store.segments.push(segment);
        }

        store.normalize_indexes();
        Ok(store)
    }

    /// Append one item: data into the current segment, header into the next
    /// slot, index entry into the in-memory maps.
    ///
    /// Rolls to a new segment when the current one is full by item count or
    /// by remaining data bytes; a segment closed short on bytes gets an
    /// END-MARKER before the rollover.
    pub fn store(&mut self, item: &Item) -> Result<()> {
        if item.keys.len() != self.key_count {
            return Err(FrostError::InvalidRequest(format!(
                "Item carries {} keys, collection declares {}",
                item.keys.len(),
                self.key_count
            )));
        }

        if self.segments.is_empty() {
            self.segments.push(self.create_segment(1)?);
        }

        let data_capacity = self.segments[0].data_capacity();
        if item.data.len() > data_capacity {
            return Err(FrostError::ItemTooLarge {
                size: item.data.len(),
                capacity: data_capacity,
            });
        }

        let current = self.segments.last_mut().unwrap();
        if current.items_full() || !current.fits(item.data.len()) {
            if !current.items_full() {
                // Closed short on bytes: mark the table before rolling
                current.write_end_marker();
            }
            let next_index = self.segments.len() as i32 + 1;
            let segment = self.create_segment(next_index)?;
            self.segments.push(segment);
        }

        let current = self.segments.last_mut().unwrap();
        let header = current.append(&item.data, &item.keys);

        let entry = IndexEntry {
            other_keys: item.keys[1..].to_vec(),
            file_index: current.file_index(),
            offset_in_file: header.offset_in_file,
            length: header.length,
        };
        self.insert_entry(item.primary_key(), entry);

        self.object_count += 1;
        self.total_size_in_bytes += item.data.len() as u64;

        Ok(())
    }

    /// Seal the feed: normalize the unique/duplicate split and return the
    /// totals for the fed version
    pub fn end_of_feed(&mut self) -> CollectionTotals {
        self.normalize_indexes();
        self.totals()
    }

    /// Look up all documents with the given primary key, in insertion order
    pub fn get_by_primary(&self, key: i64) -> Vec<Vec<u8>> {
        if let Some(entry) = self.unique_index.get(&key) {
            return vec![self.read_entry(entry)];
        }
        if let Some(entries) = self.dup_index.get(&key) {
            return entries.iter().map(|e| self.read_entry(e)).collect();
        }
        Vec::new()
    }

    /// Totals over everything stored so far
    pub fn totals(&self) -> CollectionTotals {
        CollectionTotals {
            object_count: self.object_count,
            non_unique_keys: self.dup_index.len() as u64,
            total_size_in_bytes: self.total_size_in_bytes,
        }
    }

    /// Number of distinct primary keys
    pub fn distinct_primary_keys(&self) -> usize {
        self.unique_index.len() + self.dup_index.len()
    }

    /// Number of segments backing this version
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// The version directory this store owns
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn create_segment(&self, file_index: i32) -> Result<Segment> {
        Segment::create(
            &self.dir,
            file_index,
            self.key_count,
            self.max_items_per_segment,
            self.segment_capacity,
        )
    }

    /// Incremental index update for one observed primary key
    fn insert_entry(&mut self, key: i64, entry: IndexEntry) {
        if let Some(entries) = self.dup_index.get_mut(&key) {
            entries.push(entry);
        } else if let Some(existing) = self.unique_index.remove(&key) {
            self.dup_index.insert(key, vec![existing, entry]);
        } else {
            self.unique_index.insert(key, entry);
        }
    }

    /// Restore the invariant that no key lives in both maps
    fn normalize_indexes(&mut self) {
        for key in self.dup_index.keys() {
            self.unique_index.remove(key);
        }
    }

    fn read_entry(&self, entry: &IndexEntry) -> Vec<u8> {
        let segment = &self.segments[(entry.file_index - 1) as usize];
        segment.read(entry.offset_in_file, entry.length).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(data_len: usize, keys: &[i64]) -> Item {
        Item::new(vec![0xAB; data_len], keys.to_vec())
    }

    fn open_store(dir: &Path) -> CollectionStore {
        CollectionStore::open(dir, 2, 4, 4096).unwrap()
    }

    #[test]
    fn test_unique_and_duplicate_split() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(dir.path());

        store.store(&item(10, &[1, 100])).unwrap();
        store.store(&item(20, &[2, 200])).unwrap();
        store.store(&item(30, &[1, 300])).unwrap();
        let totals = store.end_of_feed();

        assert_eq!(totals.object_count, 3);
        assert_eq!(totals.non_unique_keys, 1);
        assert_eq!(totals.total_size_in_bytes, 60);
        assert_eq!(store.distinct_primary_keys(), 2);

        let hits = store.get_by_primary(1);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].len(), 10);
        assert_eq!(hits[1].len(), 30);

        assert_eq!(store.get_by_primary(2).len(), 1);
        assert!(store.get_by_primary(99).is_empty());
    }

    #[test]
    fn test_rollover_by_item_count() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(dir.path());

        for i in 0..9 {
            store.store(&item(8, &[i, i])).unwrap();
        }
        store.end_of_feed();

        // max 4 items per segment
        assert_eq!(store.segment_count(), 3);
    }

    #[test]
    fn test_rejects_wrong_key_count() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(dir.path());

        let err = store.store(&item(4, &[1])).unwrap_err();
        assert!(matches!(err, FrostError::InvalidRequest(_)));
    }

    #[test]
    fn test_rejects_oversized_item() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(dir.path());

        // Data area: 4096 - 4*24 = 4000 bytes
        let err = store.store(&item(4001, &[1, 1])).unwrap_err();
        assert!(matches!(err, FrostError::ItemTooLarge { .. }));
        store.store(&item(4000, &[1, 1])).unwrap();
    }

    #[test]
    fn test_reopen_finalizes_index() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = open_store(dir.path());
            store.store(&item(10, &[7, 1])).unwrap();
            store.store(&item(20, &[7, 2])).unwrap();
            store.store(&item(30, &[8, 3])).unwrap();
            store.end_of_feed();
        }

        let reopened = open_store(dir.path());
        assert_eq!(reopened.totals().object_count, 3);
        assert_eq!(reopened.totals().non_unique_keys, 1);

        let hits = reopened.get_by_primary(7);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].len(), 10);
        assert_eq!(hits[1].len(), 20);
    }
}

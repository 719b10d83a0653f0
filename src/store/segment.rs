//! Memory-mapped segment files
//!
//! A segment is a fixed-size file holding a header-table prefix and a data
//! area. Writes only happen during an exclusive feed session; published
//! segments are read-only, so reads take zero-copy slices of the mapped
//! region without locking.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::{FrostError, Result};

use super::header::{header_width, ObjectHeader};

/// File-name suffix for segment files
pub const SEGMENT_SUFFIX: &str = ".bin";

/// Build a segment file name: zero-padded 4-digit index + suffix
pub fn segment_file_name(file_index: i32) -> String {
    format!("{:04}{}", file_index, SEGMENT_SUFFIX)
}

/// Parse a segment file name back to its index; `None` if the name does not
/// match `NNNN.bin`
pub fn parse_segment_file_name(name: &str) -> Option<i32> {
    let digits = name.strip_suffix(SEGMENT_SUFFIX)?;
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// A fixed-size, memory-mapped segment file
pub struct Segment {
    /// Ordinal of this segment within its version (1-based, matches the
    /// file name); in-memory enrichment only, never persisted
    file_index: i32,

    path: PathBuf,
    mmap: MmapMut,

    /// Total file size in bytes (header table + data area)
    capacity: usize,

    /// Number of keys per header
    key_count: usize,

    /// Maximum headers in the header table
    max_items: usize,

    /// Headers written (write side) or scanned (read side)
    item_count: usize,

    /// Next free byte offset in the data area
    data_next: usize,
}

impl Segment {
    /// Create a new segment file in `dir`, pre-allocated at its full size
    pub fn create(
        dir: &Path,
        file_index: i32,
        key_count: usize,
        max_items: usize,
        capacity: usize,
    ) -> Result<Self> {
        let path = dir.join(segment_file_name(file_index));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(capacity as u64)?;

        // SAFETY: the segment file is created exclusively here and owned by
        // this process for the mapping's lifetime.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            file_index,
            path,
            mmap,
            capacity,
            key_count,
            max_items,
            item_count: 0,
            data_next: header_width(key_count) * max_items,
        })
    }

    /// Open an existing segment file, rebuilding the item count and the next
    /// free data offset from its header table
    pub fn open(path: &Path, file_index: i32, key_count: usize, max_items: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let capacity = file.metadata()?.len() as usize;

        let header_table_len = header_width(key_count) * max_items;
        if capacity < header_table_len {
            return Err(FrostError::Storage(format!(
                "Segment {} is smaller than its header table ({} < {})",
                path.display(),
                capacity,
                header_table_len
            )));
        }

        // SAFETY: segments are owned exclusively by their collection store;
        // no other mapping of this file exists while it is open.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut segment = Self {
            file_index,
            path: path.to_path_buf(),
            mmap,
            capacity,
            key_count,
            max_items,
            item_count: 0,
            data_next: header_table_len,
        };

        for header in segment.headers() {
            segment.item_count += 1;
            let end = header.offset_in_file as usize + header.length as usize;
            if end > segment.data_next {
                segment.data_next = end;
            }
        }

        Ok(segment)
    }

    /// Scan the header table: all document headers up to the END-MARKER or
    /// the item cap, in write order
    pub fn headers(&self) -> Vec<ObjectHeader> {
        let width = header_width(self.key_count);
        let mut headers = Vec::new();

        for slot in 0..self.max_items {
            let start = slot * width;
            let header = ObjectHeader::decode(&self.mmap[start..start + width], self.key_count);
            if header.is_end_marker() {
                break;
            }
            headers.push(header);
        }

        headers
    }

    /// Append a document: data bytes into the data area, header into the
    /// next header slot. The caller checks capacity via `fits()` first.
    pub fn append(&mut self, data: &[u8], keys: &[i64]) -> ObjectHeader {
        debug_assert!(self.fits(data.len()));
        debug_assert_eq!(keys.len(), self.key_count);

        let header = ObjectHeader::new(self.data_next as i32, data.len() as i32, keys.to_vec());

        self.mmap[self.data_next..self.data_next + data.len()].copy_from_slice(data);

        let width = header.encoded_len();
        let slot_start = self.item_count * width;
        header.encode_into(&mut self.mmap[slot_start..slot_start + width]);

        self.item_count += 1;
        self.data_next += data.len();

        header
    }

    /// Write an END-MARKER into the next header slot; no-op when the header
    /// table is already full (scans stop at the item cap anyway)
    pub fn write_end_marker(&mut self) {
        if self.item_count >= self.max_items {
            return;
        }

        let marker = ObjectHeader::end_marker(self.key_count);
        let width = marker.encoded_len();
        let slot_start = self.item_count * width;
        marker.encode_into(&mut self.mmap[slot_start..slot_start + width]);
    }

    /// Zero-copy read of a stored document's bytes
    pub fn read(&self, offset_in_file: i32, length: i32) -> &[u8] {
        let start = offset_in_file as usize;
        &self.mmap[start..start + length as usize]
    }

    /// Whether `data_len` more bytes fit the data area
    pub fn fits(&self, data_len: usize) -> bool {
        self.data_next + data_len <= self.capacity
    }

    /// Whether the header table has no free slots left
    pub fn items_full(&self) -> bool {
        self.item_count >= self.max_items
    }

    /// Size of the data area when the segment is empty
    pub fn data_capacity(&self) -> usize {
        self.capacity - header_width(self.key_count) * self.max_items
    }

    /// Ordinal of this segment within its version
    pub fn file_index(&self) -> i32 {
        self.file_index
    }

    /// Number of documents stored in this segment
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

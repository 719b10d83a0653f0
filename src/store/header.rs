//! Object header codec
//!
//! Fixed-layout per-document record in a segment's header table.
//!
//! ## Encoding (little-endian, fixed width `8 + 8·k`)
//! ```text
//! ┌────────────────┬────────────┬──────────────────────────┐
//! │ Offset (i32)   │ Length(i32)│ Key 0 .. Key k-1 (i64)   │
//! └────────────────┴────────────┴──────────────────────────┘
//! ```
//!
//! A header with `length == 0` is the END-MARKER: no further documents exist
//! in the segment.

/// Encoded width in bytes of a header for a collection with `key_count` keys
pub const fn header_width(key_count: usize) -> usize {
    8 + 8 * key_count
}

/// A document's location and keys within a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Byte offset of the document's data within the segment file
    pub offset_in_file: i32,

    /// Length of the document's data in bytes; 0 marks the END-MARKER
    pub length: i32,

    /// The document's index keys; `index_keys[0]` is the primary key
    pub index_keys: Vec<i64>,
}

impl ObjectHeader {
    /// Create a header for a stored document
    pub fn new(offset_in_file: i32, length: i32, index_keys: Vec<i64>) -> Self {
        Self {
            offset_in_file,
            length,
            index_keys,
        }
    }

    /// Create an END-MARKER header for a collection with `key_count` keys
    pub fn end_marker(key_count: usize) -> Self {
        Self {
            offset_in_file: 0,
            length: 0,
            index_keys: vec![0; key_count],
        }
    }

    /// Whether this header terminates the header table
    pub fn is_end_marker(&self) -> bool {
        self.length == 0
    }

    /// Encoded width of this header in bytes
    pub fn encoded_len(&self) -> usize {
        header_width(self.index_keys.len())
    }

    /// Encode into `buf`, which must be exactly `encoded_len()` bytes
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), self.encoded_len());

        buf[0..4].copy_from_slice(&self.offset_in_file.to_le_bytes());
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());

        for (i, key) in self.index_keys.iter().enumerate() {
            let start = 8 + i * 8;
            buf[start..start + 8].copy_from_slice(&key.to_le_bytes());
        }
    }

    /// Decode from `buf`, which must be exactly `header_width(key_count)` bytes
    pub fn decode(buf: &[u8], key_count: usize) -> Self {
        debug_assert_eq!(buf.len(), header_width(key_count));

        let offset_in_file = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let length = i32::from_le_bytes(buf[4..8].try_into().unwrap());

        let mut index_keys = Vec::with_capacity(key_count);
        for i in 0..key_count {
            let start = 8 + i * 8;
            index_keys.push(i64::from_le_bytes(buf[start..start + 8].try_into().unwrap()));
        }

        Self {
            offset_in_file,
            length,
            index_keys,
        }
    }
}

//! Store Module
//!
//! Persistent storage layer for frozen collection versions.
//!
//! ## Responsibilities
//! - Fixed-size, memory-mapped segment files with a header-table prefix
//! - One collection store per collection version, with an in-memory
//!   primary-key index rebuilt from segment headers on open
//! - Data store lifecycle: create/drop collections, feed new versions,
//!   atomically swap the active version, retain a bounded version history
//!
//! ## Segment File Format (bit-stable)
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header Table (max_items_per_segment · header_width)     │
//! │ ┌──────────┬──────────┬───────────────────────────────┐ │
//! │ │Offset(4) │Length(4) │ Key 0 .. Key k-1 (8 each)     │ │
//! │ └──────────┴──────────┴───────────────────────────────┘ │
//! │ ... (length == 0 terminates the table)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Area                                               │
//! │   raw item bytes, written contiguously                  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers little-endian. The file is allocated at its full fixed size
//! (`segment_data_capacity_bytes`) on creation.

mod header;
mod segment;
mod metadata;
mod collection;
mod datastore;

pub use header::{header_width, ObjectHeader};
pub use segment::Segment;
pub use metadata::{CollectionInfo, CollectionMetadata, IndexDescriptor};
pub use collection::{CollectionStore, CollectionTotals};
pub use datastore::{DataStore, DirectoryDataStore, FeedSummary, NullDataStore};

use serde::{Deserialize, Serialize};

/// A single document: opaque data bytes plus its ordered index keys.
///
/// `keys[0]` is the primary key; the remaining keys are stored in segment
/// headers but not served by any secondary lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Opaque payload bytes
    pub data: Vec<u8>,

    /// Index keys; must match the collection's index count
    pub keys: Vec<i64>,
}

impl Item {
    /// Create a new item from data bytes and keys
    pub fn new(data: Vec<u8>, keys: Vec<i64>) -> Self {
        Self { data, keys }
    }

    /// The primary key (first key)
    pub fn primary_key(&self) -> i64 {
        self.keys[0]
    }
}

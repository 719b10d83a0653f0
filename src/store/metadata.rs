//! Collection metadata
//!
//! The per-collection `metadata.json` document and the derived description
//! served over the wire. `last_version` is never persisted; it is derived
//! from the version directory listing.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FrostError, Result};

use super::header::header_width;

/// File name of the metadata document inside a collection directory
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// A declared index: a name and a uniqueness hint.
///
/// The first descriptor of a collection is the primary index and must be
/// declared unique. Uniqueness is a hint, not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new<S: Into<String>>(name: S, unique: bool) -> Self {
        Self {
            name: name.into(),
            unique,
        }
    }
}

/// Persistent description of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    /// Collection name; doubles as its directory name
    pub name: String,

    /// Ordered index declarations; the first is the primary index
    pub indexes: Vec<IndexDescriptor>,

    /// Maximum documents per segment
    pub max_items_per_segment: usize,

    /// Fixed segment file size in bytes
    pub segment_data_capacity_bytes: u64,

    /// Number of versions retained after a successful feed
    pub max_versions_to_keep: usize,

    /// Greatest version directory name; derived, never persisted
    #[serde(skip)]
    pub last_version: Option<String>,
}

impl CollectionMetadata {
    /// Number of keys each item carries
    pub fn key_count(&self) -> usize {
        self.indexes.len()
    }

    /// Names of all declared indexes, primary first
    pub fn key_names(&self) -> Vec<String> {
        self.indexes.iter().map(|i| i.name.clone()).collect()
    }

    /// Validate the metadata before it is persisted or used
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Collection name must not be empty".to_string(),
            ));
        }
        if self.indexes.is_empty() {
            return Err(FrostError::InvalidRequest(
                "A collection needs at least one index".to_string(),
            ));
        }
        if self.indexes[0].name.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Primary key name must not be empty".to_string(),
            ));
        }
        if !self.indexes[0].unique {
            return Err(FrostError::InvalidRequest(
                "The primary index must be declared unique".to_string(),
            ));
        }
        if self.max_items_per_segment == 0 {
            return Err(FrostError::InvalidRequest(
                "max_items_per_segment must be positive".to_string(),
            ));
        }
        if self.segment_data_capacity_bytes == 0 {
            return Err(FrostError::InvalidRequest(
                "segment_data_capacity_bytes must be positive".to_string(),
            ));
        }
        if self.segment_data_capacity_bytes > i32::MAX as u64 {
            return Err(FrostError::InvalidRequest(format!(
                "segment_data_capacity_bytes must not exceed {} bytes",
                i32::MAX
            )));
        }
        if self.max_versions_to_keep == 0 {
            return Err(FrostError::InvalidRequest(
                "max_versions_to_keep must be at least 1".to_string(),
            ));
        }

        let header_table = header_width(self.key_count()) * self.max_items_per_segment;
        if (header_table as u64) >= self.segment_data_capacity_bytes {
            return Err(FrostError::InvalidRequest(format!(
                "Segment capacity of {} bytes leaves no data area after a {}-byte header table",
                self.segment_data_capacity_bytes, header_table
            )));
        }

        Ok(())
    }

    /// Load metadata from a collection directory
    pub fn load(collection_dir: &Path) -> Result<Self> {
        let path = collection_dir.join(METADATA_FILE_NAME);
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FrostError::Serialization(format!("{}: {}", path.display(), e)))
    }

    /// Persist metadata into a collection directory
    pub fn save(&self, collection_dir: &Path) -> Result<()> {
        let path = collection_dir.join(METADATA_FILE_NAME);
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| FrostError::Serialization(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Snapshot of a collection served by `GetCollectionsDescription`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Documents in the active version (0 when no version is fed yet)
    pub count: u64,

    /// Total data bytes in the active version
    pub size_in_bytes: u64,

    /// Active version name, if any
    pub last_version: Option<String>,

    /// Declared index names, primary first
    pub key_names: Vec<String>,

    /// Fixed segment file size in bytes
    pub segment_file_size: u64,

    /// Maximum documents per segment
    pub max_objects_per_segment: u64,
}

//! Data store
//!
//! The versioning and lifecycle layer above collection stores.
//!
//! ## Responsibilities
//! - Own the on-disk catalog: `<root>/<collection>/metadata.json` plus one
//!   directory per fed version
//! - Rebuild the active stores on `open()` from the greatest version
//!   directory of each collection
//! - Drive the feed state machine: validate, stage into a fresh version
//!   directory, atomically swap on completion, clean up on failure
//! - Retain a bounded version history after each successful swap
//!
//! ## Concurrency
//! - `active`: RwLock'd map of published stores; queries clone the `Arc`
//!   under a read lock and read without further locking
//! - `staging`: feeds in progress, one single-writer session per collection
//! - `catalog`: mutex serializing create/drop/begin-feed/swap

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{FrostError, Result};

use super::collection::CollectionStore;
use super::metadata::{CollectionInfo, CollectionMetadata, METADATA_FILE_NAME};
use super::Item;

/// Totals reported after a completed feed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedSummary {
    /// Version string the feed was published under
    pub version: String,

    /// Documents stored
    pub object_count: u64,

    /// Primary keys with more than one document
    pub non_unique_keys: u64,

    /// Sum of document data lengths in bytes
    pub total_size_in_bytes: u64,
}

/// The narrow capability set the server programs against.
///
/// Implementations: [`DirectoryDataStore`] (the real store) and
/// [`NullDataStore`] (a test double that validates parameter shapes).
pub trait DataStore: Send + Sync {
    /// Open the store; fails `AlreadyOpen` on a second call
    fn open(&self) -> Result<()>;

    /// Create a collection; fails `AlreadyExists` if it is already there
    fn create_collection(&self, metadata: CollectionMetadata) -> Result<()>;

    /// Drop a collection and its directory tree; fails `NotFound` if absent
    fn drop_collection(&self, name: &str) -> Result<()>;

    /// Describe every collection, with `last_version` derived from the
    /// version directory listing
    fn get_collections_information(&self) -> Result<BTreeMap<String, CollectionInfo>>;

    /// All documents whose primary key equals `key`, in insertion order
    fn get_by_primary_key(&self, collection: &str, key: i64) -> Result<Vec<Vec<u8>>>;

    /// Start feeding a new version; validates the version name against the
    /// current `last_version` (case-insensitive lexicographic)
    fn begin_feed(&self, collection: &str, version: &str) -> Result<()>;

    /// Append one item to the feed in progress
    fn feed_item(&self, collection: &str, item: Item) -> Result<()>;

    /// Seal the feed in progress and atomically swap it in as the active
    /// version
    fn end_feed(&self, collection: &str) -> Result<FeedSummary>;

    /// Discard the feed in progress and delete its version directory;
    /// quietly succeeds when no feed is in progress
    fn abort_feed(&self, collection: &str) -> Result<()>;

    /// Feed a whole version in one call, aborting on any item error
    fn feed(
        &self,
        collection: &str,
        version: &str,
        items: &mut dyn Iterator<Item = Item>,
    ) -> Result<FeedSummary> {
        self.begin_feed(collection, version)?;
        for item in items {
            if let Err(e) = self.feed_item(collection, item) {
                let _ = self.abort_feed(collection);
                return Err(e);
            }
        }
        self.end_feed(collection)
    }
}

/// One published collection: its metadata and the active version's store,
/// if any version has been fed yet
struct ActiveCollection {
    metadata: CollectionMetadata,
    store: Option<Arc<CollectionStore>>,
}

/// A feed in progress: the staging store writing into a fresh version
/// directory, not yet visible to queries
struct FeedSession {
    version: String,
    store: CollectionStore,
}

/// Directory-backed data store
pub struct DirectoryDataStore {
    root: PathBuf,
    opened: AtomicBool,
    active: RwLock<HashMap<String, ActiveCollection>>,
    staging: Mutex<HashMap<String, Arc<Mutex<FeedSession>>>>,
    catalog: Mutex<()>,
}

impl DirectoryDataStore {
    /// Create a store over the given root directory; `open()` must be
    /// called before any other operation
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            opened: AtomicBool::new(false),
            active: RwLock::new(HashMap::new()),
            staging: Mutex::new(HashMap::new()),
            catalog: Mutex::new(()),
        }
    }

    /// The root directory this store owns
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.opened.load(Ordering::Acquire) {
            return Err(FrostError::NotOpen);
        }
        Ok(())
    }

    fn collection_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Version directory names under a collection, sorted lexicographically
    fn list_versions(collection_dir: &Path) -> Result<Vec<String>> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(collection_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                versions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Collection names under the root: subdirectories carrying a metadata
    /// document
    fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() && entry.path().join(METADATA_FILE_NAME).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete the oldest version directories until at most
    /// `max_versions_to_keep` remain. The active version is the greatest
    /// and is never the oldest while the count exceeds the cap.
    fn apply_retention(&self, collection: &str, max_versions_to_keep: usize) -> Result<()> {
        let dir = self.collection_dir(collection);
        let versions = Self::list_versions(&dir)?;

        if versions.len() <= max_versions_to_keep {
            return Ok(());
        }

        for version in &versions[..versions.len() - max_versions_to_keep] {
            tracing::info!(
                "Retention: dropping version '{}' of collection '{}'",
                version,
                collection
            );
            fs::remove_dir_all(dir.join(version))?;
        }

        Ok(())
    }
}

impl DataStore for DirectoryDataStore {
    fn open(&self) -> Result<()> {
        if self.opened.swap(true, Ordering::AcqRel) {
            return Err(FrostError::AlreadyOpen);
        }

        let result = (|| {
            fs::create_dir_all(&self.root)?;

            let mut active = self.active.write();
            for name in self.list_collections()? {
                let dir = self.collection_dir(&name);
                let metadata = CollectionMetadata::load(&dir)?;

                let versions = Self::list_versions(&dir)?;
                let store = match versions.last() {
                    Some(version) => {
                        tracing::info!(
                            "Opening collection '{}' at version '{}'",
                            name,
                            version
                        );
                        Some(Arc::new(CollectionStore::open(
                            &dir.join(version),
                            metadata.key_count(),
                            metadata.max_items_per_segment,
                            metadata.segment_data_capacity_bytes as usize,
                        )?))
                    }
                    None => None,
                };

                active.insert(name, ActiveCollection { metadata, store });
            }
            Ok(())
        })();

        if result.is_err() {
            self.opened.store(false, Ordering::Release);
            self.active.write().clear();
        }
        result
    }

    fn create_collection(&self, metadata: CollectionMetadata) -> Result<()> {
        self.ensure_open()?;
        metadata.validate()?;

        let _catalog = self.catalog.lock();

        let dir = self.collection_dir(&metadata.name);
        if dir.exists() {
            return Err(FrostError::AlreadyExists(metadata.name));
        }

        fs::create_dir_all(&dir)?;
        metadata.save(&dir)?;

        tracing::info!("Created collection '{}'", metadata.name);
        self.active.write().insert(
            metadata.name.clone(),
            ActiveCollection {
                metadata,
                store: None,
            },
        );
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        self.ensure_open()?;

        let _catalog = self.catalog.lock();

        let dir = self.collection_dir(name);
        if !dir.exists() {
            return Err(FrostError::NotFound(name.to_string()));
        }

        // Close the active store and any feed in progress before deleting
        self.active.write().remove(name);
        self.staging.lock().remove(name);

        fs::remove_dir_all(&dir)?;
        tracing::info!("Dropped collection '{}'", name);
        Ok(())
    }

    fn get_collections_information(&self) -> Result<BTreeMap<String, CollectionInfo>> {
        self.ensure_open()?;

        let active = self.active.read();
        let mut result = BTreeMap::new();

        for name in self.list_collections()? {
            let dir = self.collection_dir(&name);
            let metadata = CollectionMetadata::load(&dir)?;
            let last_version = Self::list_versions(&dir)?.pop();

            let (count, size_in_bytes) = match active.get(&name).and_then(|c| c.store.as_ref()) {
                Some(store) => {
                    let totals = store.totals();
                    (totals.object_count, totals.total_size_in_bytes)
                }
                None => (0, 0),
            };

            result.insert(
                name,
                CollectionInfo {
                    count,
                    size_in_bytes,
                    last_version,
                    key_names: metadata.key_names(),
                    segment_file_size: metadata.segment_data_capacity_bytes,
                    max_objects_per_segment: metadata.max_items_per_segment as u64,
                },
            );
        }

        Ok(result)
    }

    fn get_by_primary_key(&self, collection: &str, key: i64) -> Result<Vec<Vec<u8>>> {
        self.ensure_open()?;

        let store = {
            let active = self.active.read();
            let entry = active
                .get(collection)
                .ok_or_else(|| FrostError::NotFound(collection.to_string()))?;
            match entry.store.as_ref() {
                Some(store) => Arc::clone(store),
                // No version fed yet: nothing to find
                None => return Ok(Vec::new()),
            }
        };

        Ok(store.get_by_primary(key))
    }

    fn begin_feed(&self, collection: &str, version: &str) -> Result<()> {
        self.ensure_open()?;
        if version.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Version name must not be empty".to_string(),
            ));
        }

        let _catalog = self.catalog.lock();

        let dir = self.collection_dir(collection);
        if !dir.exists() {
            return Err(FrostError::NotFound(collection.to_string()));
        }
        let metadata = {
            let active = self.active.read();
            active
                .get(collection)
                .ok_or_else(|| FrostError::NotFound(collection.to_string()))?
                .metadata
                .clone()
        };

        let mut staging = self.staging.lock();
        if staging.contains_key(collection) {
            return Err(FrostError::InvalidRequest(format!(
                "A feed is already in progress for collection '{}'",
                collection
            )));
        }

        let version_dir = dir.join(version);
        if version_dir.exists() {
            return Err(FrostError::VersionExists {
                collection: collection.to_string(),
                version: version.to_string(),
            });
        }

        if let Some(last_version) = Self::list_versions(&dir)?.pop() {
            if version.to_lowercase() <= last_version.to_lowercase() {
                return Err(FrostError::VersionNotNewer {
                    collection: collection.to_string(),
                    version: version.to_string(),
                    last_version,
                });
            }
        }

        fs::create_dir_all(&version_dir)?;
        let store = CollectionStore::open(
            &version_dir,
            metadata.key_count(),
            metadata.max_items_per_segment,
            metadata.segment_data_capacity_bytes as usize,
        )?;

        tracing::info!(
            "Feeding collection '{}' version '{}'",
            collection,
            version
        );
        staging.insert(
            collection.to_string(),
            Arc::new(Mutex::new(FeedSession {
                version: version.to_string(),
                store,
            })),
        );
        Ok(())
    }

    fn feed_item(&self, collection: &str, item: Item) -> Result<()> {
        self.ensure_open()?;

        let session = {
            let staging = self.staging.lock();
            match staging.get(collection) {
                Some(session) => Arc::clone(session),
                None => {
                    return Err(FrostError::InvalidRequest(format!(
                        "No feed in progress for collection '{}'",
                        collection
                    )))
                }
            }
        };

        let result = session.lock().store.store(&item);
        result
    }

    fn end_feed(&self, collection: &str) -> Result<FeedSummary> {
        self.ensure_open()?;

        let session = self.staging.lock().remove(collection).ok_or_else(|| {
            FrostError::InvalidRequest(format!(
                "No feed in progress for collection '{}'",
                collection
            ))
        })?;
        let session = match Arc::try_unwrap(session) {
            Ok(mutex) => mutex.into_inner(),
            Err(_) => {
                return Err(FrostError::Storage(
                    "Feed session still in use at end of feed".to_string(),
                ))
            }
        };

        let FeedSession { version, mut store } = session;
        let totals = store.end_of_feed();

        let _catalog = self.catalog.lock();

        let max_versions_to_keep = {
            let mut active = self.active.write();
            let entry = match active.get_mut(collection) {
                Some(entry) => entry,
                None => {
                    // Collection dropped mid-feed: discard the staged version
                    drop(store);
                    let _ = fs::remove_dir_all(self.collection_dir(collection).join(&version));
                    return Err(FrostError::NotFound(collection.to_string()));
                }
            };

            // The atomic swap: queries started after this point see the new
            // version; the previous store is closed when its last reader is
            // done with it
            entry.store = Some(Arc::new(store));
            entry.metadata.last_version = Some(version.clone());
            entry.metadata.max_versions_to_keep
        };

        // The version is published at this point; a failed retention pass
        // must not unpublish it
        if let Err(e) = self.apply_retention(collection, max_versions_to_keep) {
            tracing::warn!(
                "Retention pass failed for collection '{}': {}",
                collection,
                e
            );
        }

        tracing::info!(
            "Published collection '{}' version '{}' ({} objects, {} bytes)",
            collection,
            version,
            totals.object_count,
            totals.total_size_in_bytes
        );

        Ok(FeedSummary {
            version,
            object_count: totals.object_count,
            non_unique_keys: totals.non_unique_keys,
            total_size_in_bytes: totals.total_size_in_bytes,
        })
    }

    fn abort_feed(&self, collection: &str) -> Result<()> {
        self.ensure_open()?;

        let session = match self.staging.lock().remove(collection) {
            Some(session) => session,
            None => return Ok(()),
        };

        let version = session.lock().version.clone();
        // Close the staging mmaps before deleting the directory
        drop(session);

        let version_dir = self.collection_dir(collection).join(&version);
        if version_dir.exists() {
            fs::remove_dir_all(&version_dir)?;
        }

        tracing::warn!(
            "Aborted feed of collection '{}' version '{}'",
            collection,
            version
        );
        Ok(())
    }
}

// =============================================================================
// Null implementation
// =============================================================================

/// A data store that validates parameter shapes and records calls without
/// touching the filesystem. Useful for exercising the server and protocol
/// layers in isolation.
#[derive(Default)]
pub struct NullDataStore {
    opened: AtomicBool,
    calls: Mutex<Vec<String>>,
    feeds: Mutex<HashMap<String, (String, u64)>>,
}

impl NullDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The operations invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl DataStore for NullDataStore {
    fn open(&self) -> Result<()> {
        if self.opened.swap(true, Ordering::AcqRel) {
            return Err(FrostError::AlreadyOpen);
        }
        self.record("open".to_string());
        Ok(())
    }

    fn create_collection(&self, metadata: CollectionMetadata) -> Result<()> {
        metadata.validate()?;
        self.record(format!("create_collection:{}", metadata.name));
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Collection name must not be empty".to_string(),
            ));
        }
        self.record(format!("drop_collection:{}", name));
        Ok(())
    }

    fn get_collections_information(&self) -> Result<BTreeMap<String, CollectionInfo>> {
        self.record("get_collections_information".to_string());
        Ok(BTreeMap::new())
    }

    fn get_by_primary_key(&self, collection: &str, key: i64) -> Result<Vec<Vec<u8>>> {
        if collection.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Collection name must not be empty".to_string(),
            ));
        }
        self.record(format!("get_by_primary_key:{}:{}", collection, key));
        Ok(Vec::new())
    }

    fn begin_feed(&self, collection: &str, version: &str) -> Result<()> {
        if collection.is_empty() || version.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Collection and version must not be empty".to_string(),
            ));
        }
        self.record(format!("begin_feed:{}:{}", collection, version));
        self.feeds
            .lock()
            .insert(collection.to_string(), (version.to_string(), 0));
        Ok(())
    }

    fn feed_item(&self, collection: &str, item: Item) -> Result<()> {
        if item.keys.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Item must carry at least a primary key".to_string(),
            ));
        }
        let mut feeds = self.feeds.lock();
        match feeds.get_mut(collection) {
            Some((_, count)) => {
                *count += 1;
                Ok(())
            }
            None => Err(FrostError::InvalidRequest(format!(
                "No feed in progress for collection '{}'",
                collection
            ))),
        }
    }

    fn end_feed(&self, collection: &str) -> Result<FeedSummary> {
        let (version, count) = self.feeds.lock().remove(collection).ok_or_else(|| {
            FrostError::InvalidRequest(format!(
                "No feed in progress for collection '{}'",
                collection
            ))
        })?;
        self.record(format!("end_feed:{}:{}", collection, count));
        Ok(FeedSummary {
            version,
            object_count: count,
            ..FeedSummary::default()
        })
    }

    fn abort_feed(&self, collection: &str) -> Result<()> {
        self.feeds.lock().remove(collection);
        self.record(format!("abort_feed:{}", collection));
        Ok(())
    }
}

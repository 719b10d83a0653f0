//! Aggregator
//!
//! Client-side fan-out over N replica pools.
//!
//! ## Behavior
//! - Queries go to any connected replica, round-robin; a socket error marks
//!   that pool disconnected and the query retries on another replica
//! - Feeds fan out: one bounded channel and one consumer thread per
//!   connected replica; each item is written once into every channel; a
//!   single replica failing never stops the others
//! - The feed version is chosen here — a UTC `YYYYMMDD_HHmmss` timestamp —
//!   so versions stay monotonic across replicas without coordination

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use chrono::Utc;
use crossbeam::channel::bounded;

use crate::error::{FrostError, Result};
use crate::store::{CollectionInfo, Item};

use super::ConnectorPool;

/// Capacity of each per-replica feed channel
pub const FEED_CHANNEL_CAPACITY: usize = 10_000;

/// Format of aggregator-chosen feed versions
const VERSION_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Fan-out over N replica pools
pub struct Aggregator {
    pools: Vec<ConnectorPool>,
    next: AtomicUsize,
}

impl Aggregator {
    /// Create an aggregator over pre-built replica pools
    pub fn new(pools: Vec<ConnectorPool>) -> Self {
        Self {
            pools,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of replicas, connected or not
    pub fn replica_count(&self) -> usize {
        self.pools.len()
    }

    /// Number of currently connected replicas
    pub fn connected_count(&self) -> usize {
        self.pools.iter().filter(|p| p.is_connected()).count()
    }

    /// Query any connected replica, round-robin with skipping.
    ///
    /// Socket errors mark the failing pool disconnected and move on to the
    /// next replica; logical errors from the server propagate.
    pub fn query_by_primary_key(
        &self,
        collection: &str,
        primary_key_values: &[i64],
    ) -> Result<Vec<Vec<u8>>> {
        let replica_count = self.pools.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);

        for offset in 0..replica_count {
            let pool = &self.pools[(start + offset) % replica_count];
            if !pool.is_connected() {
                continue;
            }
            let mut connector = match pool.get() {
                Ok(connector) => connector,
                Err(_) => continue,
            };

            match connector.query_by_primary_key(collection, primary_key_values) {
                Ok(answer) => {
                    pool.put_back(connector);
                    return Ok(answer);
                }
                Err(e) if e.is_logical() => {
                    pool.put_back(connector);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Query to {} failed: {}; retrying elsewhere", pool.endpoint(), e);
                    drop(connector);
                    pool.mark_disconnected();
                }
            }
        }

        Err(FrostError::RemoteUnavailable)
    }

    /// Feed a complete collection version to every connected replica.
    ///
    /// Returns the aggregator-chosen version string. Socket failures on
    /// individual replicas are swallowed (those pools are marked
    /// disconnected); logical errors propagate from the first failing
    /// replica. With no replica fed at all, `RemoteUnavailable` is returned.
    pub fn feed<I>(&self, collection: &str, items: I) -> Result<String>
    where
        I: IntoIterator<Item = Item>,
    {
        let connected: Vec<&ConnectorPool> =
            self.pools.iter().filter(|p| p.is_connected()).collect();
        if connected.is_empty() {
            return Err(FrostError::RemoteUnavailable);
        }

        let version = Utc::now().format(VERSION_FORMAT).to_string();

        let results: Vec<Result<()>> = thread::scope(|scope| {
            let mut senders = Vec::with_capacity(connected.len());
            let mut consumers = Vec::with_capacity(connected.len());

            for pool in &connected {
                let (sender, receiver) = bounded::<Item>(FEED_CHANNEL_CAPACITY);
                senders.push(sender);

                let version = version.as_str();
                consumers.push(scope.spawn(move || -> Result<()> {
                    let mut connector = pool.get()?;
                    let result = connector.feed(collection, version, receiver.iter());
                    match &result {
                        Ok(()) => pool.put_back(connector),
                        Err(e) if e.is_logical() => pool.put_back(connector),
                        Err(_) => {
                            drop(connector);
                            pool.mark_disconnected();
                        }
                    }
                    result
                }));
            }

            // Write each item once into every replica channel; a send only
            // fails when that replica's consumer already gave up
            for item in items {
                for sender in &senders {
                    let _ = sender.send(item.clone());
                }
            }
            drop(senders);

            consumers
                .into_iter()
                .map(|consumer| {
                    consumer
                        .join()
                        .unwrap_or_else(|_| Err(FrostError::Network("Feed consumer panicked".to_string())))
                })
                .collect()
        });

        let mut fed = 0usize;
        let mut first_logical = None;
        for result in results {
            match result {
                Ok(()) => fed += 1,
                Err(e) if e.is_logical() => {
                    if first_logical.is_none() {
                        first_logical = Some(e);
                    }
                }
                Err(e) => tracing::warn!("Feed to one replica failed: {}", e),
            }
        }

        if let Some(e) = first_logical {
            return Err(e);
        }
        if fed == 0 {
            return Err(FrostError::RemoteUnavailable);
        }

        tracing::info!(
            "Fed collection '{}' version '{}' to {}/{} replicas",
            collection,
            version,
            fed,
            connected.len()
        );
        Ok(version)
    }

    /// Declare a collection on every connected replica; all must succeed
    pub fn declare_collection(
        &self,
        collection: &str,
        primary_key_name: &str,
        other_index_names: &[String],
    ) -> Result<()> {
        self.on_all_connected(|connector| {
            connector.create_collection(collection, primary_key_name, other_index_names)
        })
    }

    /// Drop a collection on every connected replica; all must succeed
    pub fn drop_collection(&self, collection: &str) -> Result<()> {
        self.on_all_connected(|connector| connector.drop_collection(collection))
    }

    /// Catalog snapshot per replica; `None` for replicas that are
    /// disconnected or fail to answer
    pub fn get_collections_information(
        &self,
    ) -> Vec<Option<BTreeMap<String, CollectionInfo>>> {
        self.pools
            .iter()
            .map(|pool| {
                if !pool.is_connected() {
                    return None;
                }
                let mut connector = pool.get().ok()?;
                match connector.get_collections_description() {
                    Ok(description) => {
                        pool.put_back(connector);
                        Some(description)
                    }
                    Err(e) => {
                        tracing::warn!("Describe on {} failed: {}", pool.endpoint(), e);
                        if e.is_logical() {
                            pool.put_back(connector);
                        } else {
                            drop(connector);
                            pool.mark_disconnected();
                        }
                        None
                    }
                }
            })
            .collect()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Run an operation on one connector of every connected pool, requiring
    /// every call to succeed
    fn on_all_connected(
        &self,
        mut op: impl FnMut(&mut super::Connector) -> Result<()>,
    ) -> Result<()> {
        let mut reached = 0usize;
        for pool in &self.pools {
            if !pool.is_connected() {
                continue;
            }
            let mut connector = pool.get()?;
            match op(&mut connector) {
                Ok(()) => {
                    pool.put_back(connector);
                    reached += 1;
                }
                Err(e) => {
                    if e.is_logical() {
                        pool.put_back(connector);
                    } else {
                        drop(connector);
                        pool.mark_disconnected();
                    }
                    return Err(e);
                }
            }
        }

        if reached == 0 {
            return Err(FrostError::RemoteUnavailable);
        }
        Ok(())
    }
}

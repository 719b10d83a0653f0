//! Integration tests for FrostKV
//!
//! Note: Most tests live in dedicated test modules:
//! - Store tests: tests/store_tests.rs
//! - Data store tests: tests/datastore_tests.rs
//! - Protocol tests: tests/protocol_tests.rs
//! - Server tests: tests/server_tests.rs
//! - Client tests: tests/client_tests.rs
//!
//! This file contains configuration tests and higher-level scenarios that
//! span multiple components.

use std::sync::Arc;

use frostkv::{
    Aggregator, Config, Connector, ConnectorPool, DataStore, DirectoryDataStore, Item,
    ReplicaEndpoint, Server,
};
use tempfile::TempDir;

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.data_dir.to_str().unwrap(), "./frostkv_data");
    assert_eq!(config.listen_addr, "127.0.0.1:9450");
    assert_eq!(config.max_connections, 1024);
    assert_eq!(config.feed_queue_capacity, 1_000_000);
    assert_eq!(config.default_max_items_per_segment, 1_000_000);
    assert_eq!(config.default_segment_capacity_bytes, 1 << 30);
    assert_eq!(config.default_max_versions_to_keep, 3);
}

#[test]
fn test_config_builder() {
    let config = Config::builder()
        .data_dir("/custom/path")
        .listen_addr("0.0.0.0:8080")
        .max_connections(100)
        .feed_queue_capacity(5_000)
        .default_max_items_per_segment(128)
        .default_segment_capacity_bytes(1 << 20)
        .default_max_versions_to_keep(5)
        .build();

    assert_eq!(config.data_dir.to_str().unwrap(), "/custom/path");
    assert_eq!(config.listen_addr, "0.0.0.0:8080");
    assert_eq!(config.max_connections, 100);
    assert_eq!(config.feed_queue_capacity, 5_000);
    assert_eq!(config.default_max_items_per_segment, 128);
    assert_eq!(config.default_segment_capacity_bytes, 1 << 20);
    assert_eq!(config.default_max_versions_to_keep, 5);
}

#[test]
fn test_config_builder_default_values() {
    // Builder should start with default values
    let config = Config::builder().build();
    let default_config = Config::default();

    assert_eq!(config.data_dir, default_config.data_dir);
    assert_eq!(config.listen_addr, default_config.listen_addr);
    assert_eq!(config.feed_queue_capacity, default_config.feed_queue_capacity);
}

// =============================================================================
// End-to-End Integration Tests
// =============================================================================

fn start_server(dir: &TempDir) -> Server {
    let config = Config::builder()
        .data_dir(dir.path())
        .listen_addr("127.0.0.1:0")
        .feed_queue_capacity(10_000)
        .default_max_items_per_segment(128)
        .default_segment_capacity_bytes(1 << 18)
        .build();

    let store = Arc::new(DirectoryDataStore::new(dir.path()));
    store.open().unwrap();

    let mut server = Server::new(config, store);
    server.start().unwrap();
    server
}

#[test]
fn test_full_lifecycle() {
    let dir = TempDir::new().unwrap();

    // Phase 1: declare, feed two versions through the aggregator, query
    {
        let server = start_server(&dir);
        let pool = ConnectorPool::new(ReplicaEndpoint::from(server.local_addr().unwrap()), 2);
        let aggregator = Aggregator::new(vec![pool]);

        aggregator
            .declare_collection("events", "id", &["source".to_string()])
            .unwrap();

        let first: Vec<Item> = (0..300i64)
            .map(|i| Item::new(vec![1u8; 50], vec![i, i % 7]))
            .collect();
        let v1 = aggregator.feed("events", first).unwrap();

        // Aggregator versions have one-second granularity; a second feed
        // inside the same second would not dominate the first
        std::thread::sleep(std::time::Duration::from_millis(1100));

        let second: Vec<Item> = (0..200i64)
            .map(|i| Item::new(vec![2u8; 80], vec![i, i % 7]))
            .collect();
        let v2 = aggregator.feed("events", second).unwrap();
        assert!(v2 > v1);

        // The second version is the one answering
        let hits = aggregator.query_by_primary_key("events", &[42]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].len(), 80);

        let infos = aggregator.get_collections_information();
        let info = infos[0].as_ref().unwrap();
        assert_eq!(info["events"].count, 200);
        assert_eq!(info["events"].last_version.as_deref(), Some(v2.as_str()));
    }

    // Phase 2: a fresh server over the same directory serves the same data
    {
        let server = start_server(&dir);
        let addr = server.local_addr().unwrap();
        let mut connector = Connector::connect("127.0.0.1", addr.port()).unwrap();

        let hits = connector.query_by_primary_key("events", &[42]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].len(), 80);

        let collections = connector.get_collections_description().unwrap();
        assert_eq!(collections["events"].count, 200);
    }
}

#[test]
fn test_many_connections_share_one_server() {
    let dir = TempDir::new().unwrap();
    let server = start_server(&dir);
    let port = server.local_addr().unwrap().port();

    {
        let mut connector = Connector::connect("127.0.0.1", port).unwrap();
        connector.create_collection("events", "id", &[]).unwrap();
        connector
            .feed(
                "events",
                "001",
                (0..100i64).map(|i| Item::new(vec![9u8; 16], vec![i])),
            )
            .unwrap();
    }

    // Several threads query concurrently over their own connections;
    // responses stay FIFO within each connection
    std::thread::scope(|scope| {
        for t in 0..4 {
            scope.spawn(move || {
                let mut connector = Connector::connect("127.0.0.1", port).unwrap();
                for i in 0..50i64 {
                    let key = (i + t) % 100;
                    let hits = connector.query_by_primary_key("events", &[key]).unwrap();
                    assert_eq!(hits.len(), 1);
                    assert_eq!(hits[0].len(), 16);
                }
            });
        }
    });

    assert!(server.is_running());
}

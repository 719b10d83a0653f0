//! End-to-end tests for the TCP server and connector
//!
//! These tests run a real server over a loopback socket and drive it with
//! the client connector: ping, catalog operations, feeds, and queries.

use std::sync::Arc;

use frostkv::{Config, Connector, DataStore, DirectoryDataStore, FrostError, Item, Server};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Start a server over a fresh data directory on an OS-chosen port
fn start_server(dir: &TempDir) -> (Server, Connector) {
    let config = Config::builder()
        .data_dir(dir.path())
        .listen_addr("127.0.0.1:0")
        .feed_queue_capacity(10_000)
        .default_max_items_per_segment(64)
        .default_segment_capacity_bytes(1 << 16)
        .build();

    let store = Arc::new(DirectoryDataStore::new(dir.path()));
    store.open().unwrap();

    let mut server = Server::new(config, store);
    server.start().unwrap();

    let addr = server.local_addr().unwrap();
    let connector = Connector::connect("127.0.0.1", addr.port()).unwrap();
    (server, connector)
}

fn item(data_len: usize, keys: &[i64]) -> Item {
    Item::new(vec![0x11; data_len], keys.to_vec())
}

// =============================================================================
// Basic Request Tests
// =============================================================================

#[test]
fn test_ping() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    assert!(connector.ping());
    // Ping is idempotent
    assert!(connector.ping());
    assert!(connector.is_healthy());
}

#[test]
fn test_create_describe_drop() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    connector
        .create_collection("persons", "id", &["name".to_string(), "age".to_string()])
        .unwrap();

    let collections = connector.get_collections_description().unwrap();
    assert_eq!(collections.len(), 1);
    let persons = &collections["persons"];
    assert_eq!(persons.key_names, vec!["id", "name", "age"]);
    assert_eq!(persons.last_version, None);
    assert_eq!(persons.count, 0);
    assert_eq!(persons.max_objects_per_segment, 64);

    connector.drop_collection("persons").unwrap();
    assert!(connector.get_collections_description().unwrap().is_empty());
}

#[test]
fn test_create_rejects_empty_primary_key() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    let err = connector.create_collection("persons", "", &[]).unwrap_err();
    assert!(matches!(err, FrostError::Remote(_)));

    // The connection survives a failed request
    assert!(connector.ping());
}

#[test]
fn test_duplicate_create_reports_failure_status() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    connector.create_collection("persons", "id", &[]).unwrap();
    let err = connector
        .create_collection("persons", "id", &[])
        .unwrap_err();
    match err {
        FrostError::Remote(message) => assert!(message.contains("persons")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_drop_missing_collection_reports_failure_status() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    let err = connector.drop_collection("ghosts").unwrap_err();
    assert!(matches!(err, FrostError::Remote(_)));
}

#[test]
fn test_query_validation() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    let err = connector.query_by_primary_key("persons", &[]).unwrap_err();
    assert!(matches!(err, FrostError::Remote(_)));

    let err = connector.query_by_primary_key("", &[1]).unwrap_err();
    assert!(matches!(err, FrostError::Remote(_)));
}

// =============================================================================
// Feed Tests
// =============================================================================

#[test]
fn test_feed_and_query() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    connector
        .create_collection("persons", "id", &["client_id".to_string()])
        .unwrap();

    connector
        .feed(
            "persons",
            "001",
            vec![item(100, &[1, 200]), item(1000, &[2, 300])],
        )
        .unwrap();

    let hits = connector.query_by_primary_key("persons", &[2]).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].len(), 1000);

    let collections = connector.get_collections_description().unwrap();
    assert_eq!(collections["persons"].last_version.as_deref(), Some("001"));
    assert_eq!(collections["persons"].count, 2);
}

#[test]
fn test_feed_spanning_segments() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    connector
        .create_collection("persons", "id", &["client_id".to_string()])
        .unwrap();

    // 64 items per segment, 64 KiB segments: 500 items spill over several
    // segments by item count
    let items: Vec<Item> = (0..500i64)
        .map(|i| item(if i % 2 == 0 { 100 } else { 10 }, &[i, i + 1]))
        .collect();
    connector.feed("persons", "001", items).unwrap();

    let hits = connector
        .query_by_primary_key("persons", &[0, 1, 499])
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].len(), 100);
    assert_eq!(hits[1].len(), 10);
    assert_eq!(hits[2].len(), 10);

    let collections = connector.get_collections_description().unwrap();
    assert_eq!(collections["persons"].count, 500);
}

#[test]
fn test_query_concatenates_multiple_keys() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    connector
        .create_collection("persons", "id", &["client_id".to_string()])
        .unwrap();
    connector
        .feed(
            "persons",
            "001",
            vec![
                item(10, &[1, 0]),
                item(20, &[2, 0]),
                item(30, &[1, 1]),
                item(40, &[3, 0]),
            ],
        )
        .unwrap();

    // Key 1 resolves to two documents, key 3 to one, key 9 to none
    let hits = connector
        .query_by_primary_key("persons", &[1, 9, 3])
        .unwrap();
    assert_eq!(
        hits.iter().map(|d| d.len()).collect::<Vec<_>>(),
        vec![10, 30, 40]
    );
}

#[test]
fn test_feed_version_monotonicity_over_wire() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    connector
        .create_collection("persons", "id", &["client_id".to_string()])
        .unwrap();
    connector
        .feed("persons", "v1", vec![item(10, &[1, 0])])
        .unwrap();
    connector
        .feed("persons", "v2", vec![item(10, &[1, 0])])
        .unwrap();

    let err = connector
        .feed("persons", "v1", vec![item(10, &[1, 0])])
        .unwrap_err();
    match err {
        FrostError::Remote(message) => assert!(message.contains("already exists")),
        other => panic!("unexpected error: {:?}", other),
    }

    let err = connector
        .feed("persons", "v0", vec![item(10, &[1, 0])])
        .unwrap_err();
    match err {
        FrostError::Remote(message) => assert!(message.contains("not newer")),
        other => panic!("unexpected error: {:?}", other),
    }

    // Failed begin-feeds leave the connection usable
    assert!(connector.ping());
    connector
        .feed("persons", "v3", vec![item(10, &[1, 0])])
        .unwrap();
}

#[test]
fn test_feed_failure_mid_stream_reports_status() {
    let dir = TempDir::new().unwrap();
    let (_server, mut connector) = start_server(&dir);

    connector
        .create_collection("persons", "id", &["client_id".to_string()])
        .unwrap();

    // An item with the wrong key count fails server-side mid-feed; the
    // server drains the stream and reports a failure status
    let items = vec![item(10, &[1, 0]), item(10, &[2])];
    let err = connector.feed("persons", "001", items).unwrap_err();
    assert!(matches!(err, FrostError::Remote(_)));

    // The staged version was discarded; the same version feeds cleanly
    connector
        .feed("persons", "001", vec![item(10, &[1, 0])])
        .unwrap();
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_fed_data_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let (mut server, mut connector) = start_server(&dir);
        connector
            .create_collection("persons", "id", &["client_id".to_string()])
            .unwrap();
        connector
            .feed(
                "persons",
                "001",
                vec![item(123, &[1, 200]), item(456, &[2, 300])],
            )
            .unwrap();
        server.shutdown();
    }

    // A fresh server over the same directory rebuilds the index by
    // scanning segment headers
    let (_server, mut connector) = start_server(&dir);
    let hits = connector.query_by_primary_key("persons", &[1]).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].len(), 123);
}

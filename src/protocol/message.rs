//! Message definitions
//!
//! Typed request/response messages and their wire tags.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::CollectionInfo;

// =============================================================================
// Wire Tags
// =============================================================================

pub const TAG_PING: i32 = 1;
pub const TAG_BEGIN_FEED: i32 = 2;
/// Reserved: feed items are never individually framed; they travel inside
/// feed batches after an accepted BeginFeed.
pub const TAG_FEED_ITEM: i32 = 3;
pub const TAG_CREATE_COLLECTION: i32 = 5;
pub const TAG_STATUS_RESPONSE: i32 = 6;
pub const TAG_QUERY_BY_PRIMARY_KEY: i32 = 7;
pub const TAG_QUERY_RESPONSE: i32 = 8;
pub const TAG_DROP_COLLECTION: i32 = 9;
pub const TAG_GET_COLLECTIONS_DESCRIPTION: i32 = 10;
pub const TAG_COLLECTIONS_DESCRIPTION: i32 = 11;

// =============================================================================
// Payload Types
// =============================================================================

/// Announces a streaming feed of a new collection version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginFeedRequest {
    pub collection: String,
    pub version: String,
}

/// Declares a new collection; the first index (the primary key) is unique,
/// the others are not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCollectionRequest {
    pub collection: String,
    pub primary_key_name: String,
    pub other_index_names: Vec<String>,
}

/// Generic success/failure reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl StatusResponse {
    /// Create a success status
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Create a failure status with a human-readable message
    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Requests all documents matching any of the given primary keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryByPrimaryKeyRequest {
    pub collection: String,
    pub primary_key_values: Vec<i64>,
}

/// Documents answering a query, concatenated across the requested keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub single_answer: bool,
    pub objects_data: Vec<Vec<u8>>,
    pub collection: Option<String>,
}

/// Drops a collection and everything under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCollectionRequest {
    pub collection: String,
}

/// Per-collection description snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionsDescriptionResponse {
    pub collections: BTreeMap<String, CollectionInfo>,
}

// =============================================================================
// Message Envelope
// =============================================================================

/// A parsed wire message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Health check; echoed verbatim
    Ping,

    /// Start a feed stream
    BeginFeed(BeginFeedRequest),

    /// Declare a collection
    CreateCollection(CreateCollectionRequest),

    /// Success/failure reply
    Status(StatusResponse),

    /// Primary-key lookup
    QueryByPrimaryKey(QueryByPrimaryKeyRequest),

    /// Lookup answer
    QueryResponse(QueryResponse),

    /// Drop a collection
    DropCollection(DropCollectionRequest),

    /// Request the catalog snapshot
    GetCollectionsDescription,

    /// Catalog snapshot
    CollectionsDescription(CollectionsDescriptionResponse),
}

impl Message {
    /// The wire tag of this message
    pub fn tag(&self) -> i32 {
        match self {
            Message::Ping => TAG_PING,
            Message::BeginFeed(_) => TAG_BEGIN_FEED,
            Message::CreateCollection(_) => TAG_CREATE_COLLECTION,
            Message::Status(_) => TAG_STATUS_RESPONSE,
            Message::QueryByPrimaryKey(_) => TAG_QUERY_BY_PRIMARY_KEY,
            Message::QueryResponse(_) => TAG_QUERY_RESPONSE,
            Message::DropCollection(_) => TAG_DROP_COLLECTION,
            Message::GetCollectionsDescription => TAG_GET_COLLECTIONS_DESCRIPTION,
            Message::CollectionsDescription(_) => TAG_COLLECTIONS_DESCRIPTION,
        }
    }
}

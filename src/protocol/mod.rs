//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Tag (4)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Tag and length are little-endian i32. Payloads are bincode-serialized
//! message structs; an empty payload (`Len == 0`) is valid.
//!
//! ## Message Tags
//! - 1:  Ping                      (either direction, echoed)
//! - 2:  BeginFeed                 (C→S)
//! - 3:  FeedItem                  (reserved; items travel inside feed batches)
//! - 5:  CreateCollection          (C→S)
//! - 6:  StatusResponse            (S→C)
//! - 7:  QueryByPrimaryKey         (C→S)
//! - 8:  QueryResponse             (S→C)
//! - 9:  DropCollection            (C→S)
//! - 10: GetCollectionsDescription (C→S)
//! - 11: CollectionsDescription    (S→C)
//!
//! ## Feed Batches
//! After an accepted BeginFeed, items stream as raw batch frames (see
//! [`feed`]), terminated by an empty batch. Batches are not tagged frames.

mod message;
mod codec;
pub mod feed;

pub use message::{
    BeginFeedRequest, CollectionsDescriptionResponse, CreateCollectionRequest,
    DropCollectionRequest, Message, QueryByPrimaryKeyRequest, QueryResponse, StatusResponse,
};
pub use codec::{read_message, write_message, FrameBuffer, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};

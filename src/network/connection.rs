//! Connection Handler
//!
//! Handles a single client connection: read one framed message, dispatch,
//! write the response(s), repeat. Exits on client disconnect, server
//! shutdown (the listener shuts the socket down), or a protocol error.

use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::bounded;

use crate::config::Config;
use crate::error::{FrostError, Result};
use crate::protocol::feed;
use crate::protocol::{
    BeginFeedRequest, CollectionsDescriptionResponse, CreateCollectionRequest,
    DropCollectionRequest, FrameBuffer, Message, QueryByPrimaryKeyRequest, QueryResponse,
    StatusResponse,
};
use crate::store::{CollectionMetadata, DataStore, IndexDescriptor, Item};

/// Handles a single client connection
pub struct Connection {
    stream: TcpStream,
    peer: String,
    store: Arc<dyn DataStore>,
    config: Config,
    frame: FrameBuffer,
}

impl Connection {
    /// Create a new connection handler; disables Nagle on the socket
    pub fn new(stream: TcpStream, store: Arc<dyn DataStore>, config: Config) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());

        Ok(Self {
            stream,
            peer,
            store,
            config,
            frame: FrameBuffer::new(),
        })
    }

    /// The remote peer address
    pub fn peer_addr(&self) -> &str {
        &self.peer
    }

    /// Handle the connection until it closes
    pub fn handle(&mut self) -> Result<()> {
        loop {
            let message = match self.frame.read_message(&mut self.stream) {
                Ok(message) => message,
                Err(FrostError::Io(e)) if is_disconnect(&e) => {
                    tracing::debug!("Client {} disconnected", self.peer);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Closing connection {}: {}", self.peer, e);
                    return Err(e);
                }
            };

            match message {
                Message::Ping => self.write(&Message::Ping)?,
                Message::BeginFeed(request) => self.handle_begin_feed(request)?,
                other => {
                    let reply = match self.dispatch(other) {
                        Ok(reply) => reply,
                        Err(e) if e.closes_connection() => return Err(e),
                        Err(e) => Message::Status(StatusResponse::failure(e.to_string())),
                    };
                    self.write(&reply)?;
                }
            }
        }
    }

    fn write(&mut self, message: &Message) -> Result<()> {
        self.frame.write_message(&mut self.stream, message)
    }

    // =========================================================================
    // Request Handlers
    // =========================================================================

    fn dispatch(&mut self, message: Message) -> Result<Message> {
        match message {
            Message::CreateCollection(request) => self.handle_create_collection(request),
            Message::DropCollection(request) => self.handle_drop_collection(request),
            Message::GetCollectionsDescription => self.handle_get_collections_description(),
            Message::QueryByPrimaryKey(request) => self.handle_query(request),
            other => Err(FrostError::InvalidRequest(format!(
                "Unexpected message with tag {}",
                other.tag()
            ))),
        }
    }

    fn handle_create_collection(&mut self, request: CreateCollectionRequest) -> Result<Message> {
        if request.collection.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Collection name must not be empty".to_string(),
            ));
        }
        if request.primary_key_name.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Primary key name must not be empty".to_string(),
            ));
        }

        let mut indexes = vec![IndexDescriptor::new(request.primary_key_name, true)];
        indexes.extend(
            request
                .other_index_names
                .into_iter()
                .map(|name| IndexDescriptor::new(name, false)),
        );

        self.store.create_collection(CollectionMetadata {
            name: request.collection,
            indexes,
            max_items_per_segment: self.config.default_max_items_per_segment,
            segment_data_capacity_bytes: self.config.default_segment_capacity_bytes,
            max_versions_to_keep: self.config.default_max_versions_to_keep,
            last_version: None,
        })?;

        Ok(Message::Status(StatusResponse::ok()))
    }

    fn handle_drop_collection(&mut self, request: DropCollectionRequest) -> Result<Message> {
        if request.collection.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Collection name must not be empty".to_string(),
            ));
        }

        self.store.drop_collection(&request.collection)?;
        Ok(Message::Status(StatusResponse::ok()))
    }

    fn handle_get_collections_description(&mut self) -> Result<Message> {
        let collections = self.store.get_collections_information()?;
        Ok(Message::CollectionsDescription(
            CollectionsDescriptionResponse { collections },
        ))
    }

    fn handle_query(&mut self, request: QueryByPrimaryKeyRequest) -> Result<Message> {
        if request.collection.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Collection name must not be empty".to_string(),
            ));
        }
        if request.primary_key_values.is_empty() {
            return Err(FrostError::InvalidRequest(
                "Primary key value list must not be empty".to_string(),
            ));
        }

        let mut objects_data = Vec::new();
        for key in &request.primary_key_values {
            objects_data.extend(self.store.get_by_primary_key(&request.collection, *key)?);
        }

        Ok(Message::QueryResponse(QueryResponse {
            single_answer: true,
            objects_data,
            collection: Some(request.collection),
        }))
    }

    // =========================================================================
    // Feed Pipeline
    // =========================================================================

    /// Accepted feeds reply success first, then read batch frames off the
    /// same stream until the empty terminator, buffering items through a
    /// bounded channel into a single feeder thread. The channel blocking on
    /// full is what throttles the client.
    fn handle_begin_feed(&mut self, request: BeginFeedRequest) -> Result<()> {
        if request.collection.is_empty() || request.version.is_empty() {
            self.write(&Message::Status(StatusResponse::failure(
                "Collection and version must not be empty",
            )))?;
            return Ok(());
        }

        if let Err(e) = self.store.begin_feed(&request.collection, &request.version) {
            self.write(&Message::Status(StatusResponse::failure(e.to_string())))?;
            return Ok(());
        }
        self.write(&Message::Status(StatusResponse::ok()))?;

        let (sender, receiver) = bounded::<Item>(self.config.feed_queue_capacity);
        let feeder_store = Arc::clone(&self.store);
        let collection = request.collection.clone();

        let feeder = thread::Builder::new()
            .name("frostkv-feeder".to_string())
            .spawn(move || -> Result<()> {
                for item in receiver {
                    feeder_store.feed_item(&collection, item)?;
                }
                Ok(())
            });
        let feeder = match feeder {
            Ok(handle) => handle,
            Err(e) => {
                let _ = self.store.abort_feed(&request.collection);
                return Err(e.into());
            }
        };

        // Read batches until the terminator. When the feeder dies early the
        // stream is still drained so the final status reaches the client.
        let mut feeder_alive = true;
        let stream_result: Result<()> = loop {
            match feed::read_batch(&mut self.stream) {
                Ok(Some(items)) => {
                    if feeder_alive {
                        for item in items {
                            if sender.send(item).is_err() {
                                feeder_alive = false;
                                break;
                            }
                        }
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        drop(sender);

        let feed_result: Result<()> = match feeder.join() {
            Ok(result) => result,
            Err(_) => Err(FrostError::Storage("Feeder thread panicked".to_string())),
        };

        if let Err(e) = stream_result {
            // The stream is broken or corrupt: no final status can be
            // delivered reliably; clean up and close the connection
            let _ = self.store.abort_feed(&request.collection);
            tracing::warn!(
                "Feed of '{}' from {} failed on the wire: {}",
                request.collection,
                self.peer,
                e
            );
            return Err(e);
        }

        match feed_result.and_then(|_| self.store.end_feed(&request.collection)) {
            Ok(summary) => {
                tracing::info!(
                    "Feed of '{}' version '{}' from {} complete: {} objects",
                    request.collection,
                    summary.version,
                    self.peer,
                    summary.object_count
                );
                self.write(&Message::Status(StatusResponse::ok()))
            }
            Err(e) => {
                let _ = self.store.abort_feed(&request.collection);
                self.write(&Message::Status(StatusResponse::failure(e.to_string())))
            }
        }
    }
}

/// I/O error kinds that mean the peer went away rather than a real fault
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

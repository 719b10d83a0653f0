//! Connector
//!
//! A single client connection. Requests are strictly serialized: one
//! outstanding request at a time, enforced by `&mut self`.
//!
//! ## Connection Handling
//!
//! Uses a single TCP stream for sequential write-then-read. Hostnames
//! resolving to both address families connect over IPv4 for determinism
//! with local test servers.

use std::collections::BTreeMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{FrostError, Result};
use crate::protocol::feed::BatchWriter;
use crate::protocol::{
    BeginFeedRequest, CreateCollectionRequest, DropCollectionRequest, FrameBuffer, Message,
    QueryByPrimaryKeyRequest, StatusResponse,
};
use crate::store::{CollectionInfo, Item};

/// Receive timeout applied to `ping()` round trips
pub const PING_TIMEOUT: Duration = Duration::from_millis(100);

/// A single connection to one FrostKV server
pub struct Connector {
    stream: TcpStream,
    frame: FrameBuffer,
    healthy: bool,
    peer: String,
}

impl Connector {
    /// Connect to `host:port`, preferring IPv4 when the host resolves to
    /// both families
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|e| FrostError::Network(format!("Failed to resolve {}: {}", host, e)))?
            .collect();

        let addr = addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .ok_or_else(|| {
                FrostError::Network(format!("Host {} resolved to no addresses", host))
            })?;

        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;

        tracing::debug!("Connected to {}", addr);
        Ok(Self {
            stream,
            frame: FrameBuffer::new(),
            healthy: true,
            peer: addr.to_string(),
        })
    }

    /// Whether the underlying stream has seen no errors
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// The remote address this connector talks to
    pub fn peer_addr(&self) -> &str {
        &self.peer
    }

    /// Latency-bounded health check; any failure returns `false`
    pub fn ping(&mut self) -> bool {
        if self.stream.set_read_timeout(Some(PING_TIMEOUT)).is_err() {
            self.healthy = false;
            return false;
        }

        let response = self.request(&Message::Ping);
        let _ = self.stream.set_read_timeout(None);

        match response {
            Ok(Message::Ping) => true,
            Ok(_) | Err(_) => {
                self.healthy = false;
                false
            }
        }
    }

    /// Declare a collection on the server; the primary key is unique, the
    /// other indexes are not
    pub fn create_collection(
        &mut self,
        collection: &str,
        primary_key_name: &str,
        other_index_names: &[String],
    ) -> Result<()> {
        let response = self.request(&Message::CreateCollection(CreateCollectionRequest {
            collection: collection.to_string(),
            primary_key_name: primary_key_name.to_string(),
            other_index_names: other_index_names.to_vec(),
        }))?;
        expect_status(response)
    }

    /// Drop a collection on the server
    pub fn drop_collection(&mut self, collection: &str) -> Result<()> {
        let response = self.request(&Message::DropCollection(DropCollectionRequest {
            collection: collection.to_string(),
        }))?;
        expect_status(response)
    }

    /// Fetch the server's catalog snapshot
    pub fn get_collections_description(&mut self) -> Result<BTreeMap<String, CollectionInfo>> {
        let response = self.request(&Message::GetCollectionsDescription)?;
        match response {
            Message::CollectionsDescription(description) => Ok(description.collections),
            Message::Status(StatusResponse { error, .. }) => {
                Err(FrostError::Remote(error.unwrap_or_default()))
            }
            other => Err(FrostError::UnexpectedResponse(format!(
                "tag {}",
                other.tag()
            ))),
        }
    }

    /// Fetch all documents matching the given primary keys, concatenated in
    /// key order
    pub fn query_by_primary_key(
        &mut self,
        collection: &str,
        primary_key_values: &[i64],
    ) -> Result<Vec<Vec<u8>>> {
        let response = self.request(&Message::QueryByPrimaryKey(QueryByPrimaryKeyRequest {
            collection: collection.to_string(),
            primary_key_values: primary_key_values.to_vec(),
        }))?;

        match response {
            Message::QueryResponse(answer) => Ok(answer.objects_data),
            Message::Status(StatusResponse { error, .. }) => {
                Err(FrostError::Remote(error.unwrap_or_default()))
            }
            other => Err(FrostError::UnexpectedResponse(format!(
                "tag {}",
                other.tag()
            ))),
        }
    }

    /// Stream a complete collection version to the server.
    ///
    /// Sends BeginFeed, waits for acceptance, streams the items as batches
    /// terminated by an empty batch, and waits for the final status.
    pub fn feed<I>(&mut self, collection: &str, version: &str, items: I) -> Result<()>
    where
        I: IntoIterator<Item = Item>,
    {
        let response = self.request(&Message::BeginFeed(BeginFeedRequest {
            collection: collection.to_string(),
            version: version.to_string(),
        }))?;
        expect_status(response)?;

        let mut writer = BatchWriter::new();
        for item in items {
            self.guard(|conn| writer.push(&mut conn.stream, &item))?;
        }
        self.guard(|conn| writer.finish(&mut conn.stream))?;

        let response = self.receive()?;
        expect_status(response)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// One request, one response
    fn request(&mut self, message: &Message) -> Result<Message> {
        self.guard(|conn| {
            let mut stream = &conn.stream;
            conn.frame.write_message(&mut stream, message)
        })?;
        self.receive()
    }

    fn receive(&mut self) -> Result<Message> {
        self.guard(|conn| {
            let mut stream = &conn.stream;
            conn.frame.read_message(&mut stream)
        })
    }

    /// Run a stream operation, flipping `healthy` off on any error
    fn guard<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match op(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.healthy = false;
                Err(e)
            }
        }
    }
}

/// Interpret a reply that should be a StatusResponse
fn expect_status(response: Message) -> Result<()> {
    match response {
        Message::Status(StatusResponse { success: true, .. }) => Ok(()),
        Message::Status(StatusResponse { error, .. }) => {
            Err(FrostError::Remote(error.unwrap_or_default()))
        }
        other => Err(FrostError::UnexpectedResponse(format!(
            "tag {}",
            other.tag()
        ))),
    }
}

//! Frame codec
//!
//! Encoding and decoding of tagged, length-prefixed message frames over a
//! byte stream.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Tag (4)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Tag and length are little-endian i32; payloads are bincode-encoded. A
//! [`FrameBuffer`] keeps one reusable buffer per connection so steady-state
//! frames within the size ceiling are written without fresh allocation.

use std::io::{Read, Write};

use crate::error::{FrostError, Result};

use super::message::{self, Message};

/// Frame header size: 4-byte tag + 4-byte payload length
pub const FRAME_HEADER_SIZE: usize = 8;

/// Maximum payload size (1 MiB); larger frames are rejected
pub const MAX_PAYLOAD_SIZE: usize = 1 << 20;

/// Reusable encode/decode buffer for one connection
#[derive(Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(FRAME_HEADER_SIZE + MAX_PAYLOAD_SIZE),
        }
    }

    /// Encode `message` and write the complete frame to `writer`
    pub fn write_message<W: Write>(&mut self, writer: &mut W, message: &Message) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(&[0u8; FRAME_HEADER_SIZE]);

        encode_payload(message, &mut self.buf)?;

        let payload_len = self.buf.len() - FRAME_HEADER_SIZE;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(FrostError::FrameTooLarge(payload_len));
        }

        self.buf[0..4].copy_from_slice(&message.tag().to_le_bytes());
        self.buf[4..8].copy_from_slice(&(payload_len as i32).to_le_bytes());

        writer.write_all(&self.buf)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one complete frame from `reader` and decode it
    pub fn read_message<R: Read>(&mut self, reader: &mut R) -> Result<Message> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        reader.read_exact(&mut header)?;

        let tag = i32::from_le_bytes(header[0..4].try_into().unwrap());
        let payload_len = i32::from_le_bytes(header[4..8].try_into().unwrap());

        if payload_len < 0 {
            return Err(FrostError::MalformedFrame(format!(
                "Negative payload length: {}",
                payload_len
            )));
        }
        let payload_len = payload_len as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(FrostError::FrameTooLarge(payload_len));
        }

        self.buf.resize(payload_len, 0);
        if payload_len > 0 {
            reader.read_exact(&mut self.buf)?;
        }

        decode_payload(tag, &self.buf)
    }
}

/// One-shot frame write with a fresh buffer
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    FrameBuffer::default().write_message(writer, message)
}

/// One-shot frame read with a fresh buffer
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    FrameBuffer::default().read_message(reader)
}

// =============================================================================
// Payload Encoding/Decoding
// =============================================================================

fn encode_payload(message: &Message, buf: &mut Vec<u8>) -> Result<()> {
    let result = match message {
        // Empty payloads
        Message::Ping | Message::GetCollectionsDescription => return Ok(()),

        Message::BeginFeed(payload) => bincode::serialize_into(&mut *buf, payload),
        Message::CreateCollection(payload) => bincode::serialize_into(&mut *buf, payload),
        Message::Status(payload) => bincode::serialize_into(&mut *buf, payload),
        Message::QueryByPrimaryKey(payload) => bincode::serialize_into(&mut *buf, payload),
        Message::QueryResponse(payload) => bincode::serialize_into(&mut *buf, payload),
        Message::DropCollection(payload) => bincode::serialize_into(&mut *buf, payload),
        Message::CollectionsDescription(payload) => bincode::serialize_into(&mut *buf, payload),
    };

    result.map_err(|e| FrostError::Serialization(e.to_string()))
}

fn decode_payload(tag: i32, payload: &[u8]) -> Result<Message> {
    fn decode<'a, T: serde::Deserialize<'a>>(payload: &'a [u8]) -> Result<T> {
        bincode::deserialize(payload).map_err(|e| FrostError::MalformedFrame(e.to_string()))
    }

    match tag {
        message::TAG_PING => {
            expect_empty(payload, "Ping")?;
            Ok(Message::Ping)
        }
        message::TAG_BEGIN_FEED => Ok(Message::BeginFeed(decode(payload)?)),
        message::TAG_CREATE_COLLECTION => Ok(Message::CreateCollection(decode(payload)?)),
        message::TAG_STATUS_RESPONSE => Ok(Message::Status(decode(payload)?)),
        message::TAG_QUERY_BY_PRIMARY_KEY => Ok(Message::QueryByPrimaryKey(decode(payload)?)),
        message::TAG_QUERY_RESPONSE => Ok(Message::QueryResponse(decode(payload)?)),
        message::TAG_DROP_COLLECTION => Ok(Message::DropCollection(decode(payload)?)),
        message::TAG_GET_COLLECTIONS_DESCRIPTION => {
            expect_empty(payload, "GetCollectionsDescription")?;
            Ok(Message::GetCollectionsDescription)
        }
        message::TAG_COLLECTIONS_DESCRIPTION => {
            Ok(Message::CollectionsDescription(decode(payload)?))
        }
        message::TAG_FEED_ITEM => Err(FrostError::MalformedFrame(
            "Feed items travel inside feed batches, never as frames".to_string(),
        )),
        other => Err(FrostError::MalformedFrame(format!(
            "Unknown message tag: {}",
            other
        ))),
    }
}

fn expect_empty(payload: &[u8], name: &str) -> Result<()> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(FrostError::MalformedFrame(format!(
            "{} carries an unexpected payload of {} bytes",
            name,
            payload.len()
        )))
    }
}

//! Feed batch codec
//!
//! Framed batches of per-item records used only while streaming a feed.
//!
//! ## Wire Format
//! ```text
//! Batch:
//! ┌────────────────────┬────────────────┬──────────────────┐
//! │ batch_bytes_len(4) │ item_count (4) │ item_1 .. item_n │
//! └────────────────────┴────────────────┴──────────────────┘
//!
//! Item:
//! ┌──────────────┬───────────────┬──────────────────┬──────────┐
//! │ item_size(4) │ keys_count(4) │ keys (8 each)    │ data     │
//! └──────────────┴───────────────┴──────────────────┴──────────┘
//! ```
//!
//! All integers little-endian. `item_size` is the data length in bytes;
//! `batch_bytes_len` covers the item records only. An empty batch
//! (`0 ‖ 0`) terminates the stream.

use std::io::{Read, Write};

use crate::error::{FrostError, Result};
use crate::store::Item;

/// Producers flush a batch once it holds about this many payload bytes
pub const BATCH_TARGET_BYTES: usize = 1 << 20;

/// Producers flush a batch once it holds this many items
pub const BATCH_MAX_ITEMS: usize = 5_000;

/// Consumers reject batches beyond this ceiling
pub const BATCH_MAX_BYTES: usize = 64 << 20;

/// Upper bound on keys per item a consumer will accept
const MAX_KEYS_PER_ITEM: usize = 256;

/// Encoded size in bytes of one item record
fn encoded_item_len(item: &Item) -> usize {
    8 + 8 * item.keys.len() + item.data.len()
}

// =============================================================================
// Writing
// =============================================================================

/// Accumulates items and writes them out as batch frames.
///
/// Call [`push`](BatchWriter::push) per item and [`finish`](BatchWriter::finish)
/// once to flush the tail and write the terminating empty batch.
#[derive(Default)]
pub struct BatchWriter {
    buf: Vec<u8>,
    item_count: u32,
}

impl BatchWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(BATCH_TARGET_BYTES),
            item_count: 0,
        }
    }

    /// Append one item, flushing the current batch first when it is full
    pub fn push<W: Write>(&mut self, writer: &mut W, item: &Item) -> Result<()> {
        let encoded_len = encoded_item_len(item);
        if self.item_count > 0 && self.buf.len() + encoded_len > BATCH_TARGET_BYTES {
            self.flush(writer)?;
        }

        self.buf
            .extend_from_slice(&(item.data.len() as i32).to_le_bytes());
        self.buf
            .extend_from_slice(&(item.keys.len() as i32).to_le_bytes());
        for key in &item.keys {
            self.buf.extend_from_slice(&key.to_le_bytes());
        }
        self.buf.extend_from_slice(&item.data);
        self.item_count += 1;

        if self.item_count as usize >= BATCH_MAX_ITEMS {
            self.flush(writer)?;
        }
        Ok(())
    }

    /// Write the pending batch, if any
    pub fn flush<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        if self.item_count == 0 {
            return Ok(());
        }

        writer.write_all(&(self.buf.len() as i32).to_le_bytes())?;
        writer.write_all(&(self.item_count as i32).to_le_bytes())?;
        writer.write_all(&self.buf)?;

        self.buf.clear();
        self.item_count = 0;
        Ok(())
    }

    /// Flush the tail and write the terminating empty batch
    pub fn finish<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        self.flush(writer)?;
        writer.write_all(&0i32.to_le_bytes())?;
        writer.write_all(&0i32.to_le_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

// =============================================================================
// Reading
// =============================================================================

/// Read one batch from the stream.
///
/// Returns `Ok(None)` on the terminating empty batch, otherwise the batch's
/// items in wire order.
pub fn read_batch<R: Read>(reader: &mut R) -> Result<Option<Vec<Item>>> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;

    let batch_bytes_len = i32::from_le_bytes(header[0..4].try_into().unwrap());
    let item_count = i32::from_le_bytes(header[4..8].try_into().unwrap());

    if batch_bytes_len == 0 && item_count == 0 {
        return Ok(None);
    }
    if batch_bytes_len <= 0 || item_count <= 0 {
        return Err(FrostError::MalformedFrame(format!(
            "Inconsistent batch header: {} bytes, {} items",
            batch_bytes_len, item_count
        )));
    }
    let batch_bytes_len = batch_bytes_len as usize;
    if batch_bytes_len > BATCH_MAX_BYTES {
        return Err(FrostError::FrameTooLarge(batch_bytes_len));
    }

    let mut buf = vec![0u8; batch_bytes_len];
    reader.read_exact(&mut buf)?;

    let mut items = Vec::with_capacity(item_count as usize);
    let mut pos = 0usize;

    for _ in 0..item_count {
        if pos + 8 > buf.len() {
            return Err(FrostError::MalformedFrame(
                "Batch truncated inside an item header".to_string(),
            ));
        }
        let item_size = i32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        let keys_count = i32::from_le_bytes(buf[pos + 4..pos + 8].try_into().unwrap());
        pos += 8;

        if item_size < 0 || keys_count <= 0 || keys_count as usize > MAX_KEYS_PER_ITEM {
            return Err(FrostError::MalformedFrame(format!(
                "Invalid item record: {} bytes, {} keys",
                item_size, keys_count
            )));
        }

        let keys_len = keys_count as usize * 8;
        if pos + keys_len + item_size as usize > buf.len() {
            return Err(FrostError::MalformedFrame(
                "Batch truncated inside an item record".to_string(),
            ));
        }

        let mut keys = Vec::with_capacity(keys_count as usize);
        for i in 0..keys_count as usize {
            let start = pos + i * 8;
            keys.push(i64::from_le_bytes(buf[start..start + 8].try_into().unwrap()));
        }
        pos += keys_len;

        let data = buf[pos..pos + item_size as usize].to_vec();
        pos += item_size as usize;

        items.push(Item::new(data, keys));
    }

    if pos != buf.len() {
        return Err(FrostError::MalformedFrame(format!(
            "Batch declares {} bytes but items cover {}",
            buf.len(),
            pos
        )));
    }

    Ok(Some(items))
}

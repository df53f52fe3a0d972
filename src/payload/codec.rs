//! Payload codec
//!
//! Columnar on-disk representation and content hashing. Pure and stateless.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                           │
//! │   Magic: "FKSP" (4) | Version: u16 (2)                      │
//! │   RowCount: u64 (8) | ColumnCount: u32 (4)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Column Blocks (variable)                                    │
//! │   [NameLen: u32][Name][Type: u8][DataLen: u32][Data]        │
//! │   ... repeated for each column, in payload order ...        │
//! │   (Data = bincode of the column's nullable cell vector)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                            │
//! │   CRC32 over header + column blocks                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{ForkStoreError, Result};

use super::{Column, ColumnData, ColumnType, Payload};

/// Magic bytes identifying a forkstore payload file
pub const MAGIC: &[u8; 4] = b"FKSP";

/// Current payload format version
pub const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + RowCount (8) + ColumnCount (4)
pub const HEADER_SIZE: usize = 18;

/// Footer size: CRC32 (4)
pub const FOOTER_SIZE: usize = 4;

/// BLAKE3 digest of a payload's contents, as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<blake3::Hash> for ContentHash {
    fn from(hash: blake3::Hash) -> Self {
        ContentHash(hash.to_hex().to_string())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a payload to its on-disk bytes
pub fn encode(payload: &Payload) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.memory_footprint() + FOOTER_SIZE);

    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u64_le(payload.row_count() as u64);
    buf.put_u32_le(length_field("column count", payload.column_count(), U32_FIELD_LIMIT)?);

    for column in payload.columns() {
        put_column_block(&mut buf, column)?;
    }

    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);

    Ok(buf.to_vec())
}

/// Compute the content hash of a payload
///
/// Covers row count, column order, names, types and every cell. Identical
/// tables hash identically regardless of where they are stored.
pub fn content_hash(payload: &Payload) -> Result<ContentHash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(payload.row_count() as u64).to_le_bytes());

    let mut block = BytesMut::new();
    for column in payload.columns() {
        block.clear();
        put_column_block(&mut block, column)?;
        hasher.update(&block);
    }

    Ok(hasher.finalize().into())
}

/// Largest value a u32 length field can carry
const U32_FIELD_LIMIT: usize = u32::MAX as usize;

/// Checked conversion of a length into a u32 header field
///
/// Lengths above `limit` are rejected as `InvalidPayload` instead of being
/// truncated into a header that no longer describes the bytes after it.
fn length_field(what: &str, len: usize, limit: usize) -> Result<u32> {
    if len > limit {
        return Err(ForkStoreError::InvalidPayload(format!(
            "{} length {} exceeds the format limit of {}",
            what, len, limit
        )));
    }
    u32::try_from(len).map_err(|_| {
        ForkStoreError::InvalidPayload(format!("{} length {} does not fit in u32", what, len))
    })
}

/// Internal: append one column block
///
/// Shared by `encode` and `content_hash`, so an oversize column is rejected
/// before a commit touches any state.
fn put_column_block(buf: &mut BytesMut, column: &Column) -> Result<()> {
    let data = match &column.data {
        ColumnData::Numeric(cells) => bincode::serialize(cells)?,
        ColumnData::Text(cells) => bincode::serialize(cells)?,
        ColumnData::Boolean(cells) => bincode::serialize(cells)?,
        ColumnData::Temporal(cells) => bincode::serialize(cells)?,
    };

    let name_len = length_field("column name", column.name.len(), U32_FIELD_LIMIT)?;
    let data_len = length_field("column data", data.len(), U32_FIELD_LIMIT)?;

    buf.put_u32_le(name_len);
    buf.put_slice(column.name.as_bytes());
    buf.put_u8(column.column_type() as u8);
    buf.put_u32_le(data_len);
    buf.put_slice(&data);

    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a payload from its on-disk bytes, verifying magic, version and CRC
pub fn decode(bytes: &[u8]) -> Result<Payload> {
    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(ForkStoreError::Corruption(format!(
            "payload too short: {} bytes",
            bytes.len()
        )));
    }

    let (body, footer) = bytes.split_at(bytes.len() - FOOTER_SIZE);
    let stored_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let actual_crc = crc32fast::hash(body);
    if stored_crc != actual_crc {
        return Err(ForkStoreError::Corruption(format!(
            "payload CRC mismatch: stored {:08x}, computed {:08x}",
            stored_crc, actual_crc
        )));
    }

    let mut buf = body;
    if &buf[0..4] != MAGIC {
        return Err(ForkStoreError::Corruption(format!(
            "invalid payload magic: expected FKSP, got {:?}",
            &buf[0..4]
        )));
    }
    buf.advance(4);

    let version = buf.get_u16_le();
    if version != VERSION {
        return Err(ForkStoreError::Corruption(format!(
            "unsupported payload version: {}",
            version
        )));
    }

    let row_count = buf.get_u64_le() as usize;
    let column_count = buf.get_u32_le() as usize;

    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        columns.push(get_column_block(&mut buf)?);
    }

    if buf.has_remaining() {
        return Err(ForkStoreError::Corruption(format!(
            "{} trailing bytes after column blocks",
            buf.remaining()
        )));
    }

    let payload = Payload::new(columns).map_err(|e| ForkStoreError::Corruption(e.to_string()))?;
    if payload.column_count() > 0 && payload.row_count() != row_count {
        return Err(ForkStoreError::Corruption(format!(
            "header row count {} does not match columns ({})",
            row_count,
            payload.row_count()
        )));
    }

    Ok(payload)
}

/// Internal: read one column block
fn get_column_block(buf: &mut &[u8]) -> Result<Column> {
    let name_len = take_u32(buf)? as usize;
    let name_bytes = take_bytes(buf, name_len)?;
    let name = String::from_utf8(name_bytes.to_vec())
        .map_err(|e| ForkStoreError::Corruption(format!("column name is not UTF-8: {}", e)))?;

    ensure_remaining(buf, 1)?;
    let tag = buf.get_u8();
    let column_type = ColumnType::from_u8(tag)
        .ok_or_else(|| ForkStoreError::Corruption(format!("unknown column type tag {:#04x}", tag)))?;

    let data_len = take_u32(buf)? as usize;
    let data = take_bytes(buf, data_len)?;

    let data = match column_type {
        ColumnType::Numeric => ColumnData::Numeric(decode_cells(&name, data)?),
        ColumnType::Text => ColumnData::Text(decode_cells(&name, data)?),
        ColumnType::Boolean => ColumnData::Boolean(decode_cells(&name, data)?),
        ColumnType::Temporal => ColumnData::Temporal(decode_cells(&name, data)?),
    };

    Ok(Column { name, data })
}

fn decode_cells<T: serde::de::DeserializeOwned>(column: &str, data: &[u8]) -> Result<T> {
    bincode::deserialize(data).map_err(|e| {
        ForkStoreError::Corruption(format!("cells of column '{}' do not decode: {}", column, e))
    })
}

fn ensure_remaining(buf: &&[u8], needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(ForkStoreError::Corruption(format!(
            "truncated column block: need {} bytes, have {}",
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_u32_le())
}

fn take_bytes<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    ensure_remaining(buf, len)?;
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

//! WAL entry encoding.
//!
//! ```text
//! [Length: u32 LE][FormatVersion: u8][Sequence: u64 LE][OpCode: u8][Payload][CRC32: u32 LE]
//! ```
//!
//! `Length` covers everything between itself and the CRC (FormatVersion
//! through Payload); the CRC covers the same span, so a torn write is
//! caught by checksum even if the length field itself landed correctly.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use entitydb_core::{EntityDbError, Result, StoredTag};
#[cfg(test)]
use entitydb_core::Timestamp;

use crate::codec::{read_bytes, read_str, read_tag, read_tags, write_bytes, write_str, write_tag, write_tags};

/// Current WAL record format version.
pub const WAL_RECORD_FORMAT_VERSION: u8 = 1;

/// The four operation kinds that may appear in the WAL (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOpCode {
    Create = 0,
    Update = 1,
    Delete = 2,
    AddTag = 3,
}

impl WalOpCode {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(WalOpCode::Create),
            1 => Ok(WalOpCode::Update),
            2 => Ok(WalOpCode::Delete),
            3 => Ok(WalOpCode::AddTag),
            other => Err(EntityDbError::corrupt_storage(format!("unknown WAL op code {}", other))),
        }
    }
}

/// The changed entity or tag carried by a WAL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalPayload {
    Create { entity_id: String, tags: Vec<StoredTag>, content: Vec<u8> },
    Update { entity_id: String, tags: Vec<StoredTag>, content: Vec<u8> },
    Delete { entity_id: String, lifecycle: u8, reason: String, actor: String },
    AddTag { entity_id: String, tag: StoredTag },
}

impl WalPayload {
    fn op_code(&self) -> WalOpCode {
        match self {
            WalPayload::Create { .. } => WalOpCode::Create,
            WalPayload::Update { .. } => WalOpCode::Update,
            WalPayload::Delete { .. } => WalOpCode::Delete,
            WalPayload::AddTag { .. } => WalOpCode::AddTag,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            WalPayload::Create { entity_id, .. }
            | WalPayload::Update { entity_id, .. }
            | WalPayload::Delete { entity_id, .. }
            | WalPayload::AddTag { entity_id, .. } => entity_id,
        }
    }
}

/// One fully decoded WAL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub sequence: u64,
    pub payload: WalPayload,
}

impl WalRecord {
    /// Encode this record, including the length prefix and trailing CRC32.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload_buf = Vec::new();
        payload_buf.write_u8(WAL_RECORD_FORMAT_VERSION).unwrap();
        payload_buf.write_u64::<LittleEndian>(self.sequence).unwrap();
        payload_buf.write_u8(self.payload.op_code() as u8).unwrap();
        match &self.payload {
            WalPayload::Create { entity_id, tags, content }
            | WalPayload::Update { entity_id, tags, content } => {
                write_str(&mut payload_buf, entity_id);
                write_tags(&mut payload_buf, tags);
                write_bytes(&mut payload_buf, content);
            }
            WalPayload::Delete { entity_id, lifecycle, reason, actor } => {
                write_str(&mut payload_buf, entity_id);
                payload_buf.write_u8(*lifecycle).unwrap();
                write_str(&mut payload_buf, reason);
                write_str(&mut payload_buf, actor);
            }
            WalPayload::AddTag { entity_id, tag } => {
                write_str(&mut payload_buf, entity_id);
                write_tag(&mut payload_buf, tag);
            }
        }

        let mut hasher = Hasher::new();
        hasher.update(&payload_buf);
        let crc = hasher.finalize();

        let mut out = Vec::with_capacity(4 + payload_buf.len() + 4);
        out.write_u32::<LittleEndian>(payload_buf.len() as u32).unwrap();
        out.extend_from_slice(&payload_buf);
        out.write_u32::<LittleEndian>(crc).unwrap();
        out
    }

    /// Decode one record starting at the beginning of `bytes`. Returns the
    /// record and the number of bytes consumed, so callers can advance a
    /// cursor over a stream of back-to-back entries.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 4 {
            return Err(EntityDbError::corrupt_storage("WAL entry shorter than length prefix"));
        }
        let mut len_cur = Cursor::new(bytes);
        let payload_len = len_cur.read_u32::<LittleEndian>()? as usize;
        let total_len = 4 + payload_len + 4;
        if bytes.len() < total_len {
            return Err(EntityDbError::corrupt_storage("WAL entry truncated"));
        }
        if payload_len as u64 > entitydb_core::limits::MAX_WAL_ENTRY_BYTES {
            return Err(EntityDbError::corrupt_storage(format!(
                "WAL entry size {} exceeds maximum {}",
                payload_len,
                entitydb_core::limits::MAX_WAL_ENTRY_BYTES
            )));
        }
        let payload_buf = &bytes[4..4 + payload_len];
        let crc_bytes = &bytes[4 + payload_len..total_len];
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());

        let mut hasher = Hasher::new();
        hasher.update(payload_buf);
        if hasher.finalize() != stored_crc {
            return Err(EntityDbError::corrupt_storage("WAL entry checksum mismatch"));
        }

        let mut cur = Cursor::new(payload_buf);
        let format_version = cur.read_u8()?;
        if format_version != WAL_RECORD_FORMAT_VERSION {
            return Err(EntityDbError::corrupt_storage(format!(
                "unsupported WAL record format version {}",
                format_version
            )));
        }
        let sequence = cur.read_u64::<LittleEndian>()?;
        let op_code = WalOpCode::from_u8(cur.read_u8()?)?;
        let payload = match op_code {
            WalOpCode::Create => {
                let entity_id = read_str(&mut cur)?;
                let tags = read_tags(&mut cur)?;
                let content = read_bytes(&mut cur)?;
                WalPayload::Create { entity_id, tags, content }
            }
            WalOpCode::Update => {
                let entity_id = read_str(&mut cur)?;
                let tags = read_tags(&mut cur)?;
                let content = read_bytes(&mut cur)?;
                WalPayload::Update { entity_id, tags, content }
            }
            WalOpCode::Delete => {
                let entity_id = read_str(&mut cur)?;
                let lifecycle = cur.read_u8()?;
                let reason = read_str(&mut cur)?;
                let actor = read_str(&mut cur)?;
                WalPayload::Delete { entity_id, lifecycle, reason, actor }
            }
            WalOpCode::AddTag => {
                let entity_id = read_str(&mut cur)?;
                let tag = read_tag(&mut cur)?;
                WalPayload::AddTag { entity_id, tag }
            }
        };

        Ok((WalRecord { sequence, payload }, total_len))
    }
}

//! Data-section record encoding.
//!
//! ```text
//! [IdLen: u32][Id][TagCount: u32][TagSectionLen: u32][Tags...]
//! [OrigSize: u64][StoredSize: u64][Flags: u8][ContentBytes...]
//! ```
//!
//! `Flags` bit 0 marks gzip compression, bit 1 marks that `content`
//! holds a chunk manifest rather than raw bytes (spec.md §4.1, §3
//! "Chunking"). Entries are append-only within a writer session; a
//! checkpoint is what reclaims the space of superseded versions.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use entitydb_core::{EntityDbError, Result, StoredTag};

use crate::codec::{read_bytes, read_str, read_tags, write_bytes, write_str, write_tags};

/// Bit flags stored alongside a data record.
pub const FLAG_COMPRESSED: u8 = 0b0000_0001;
pub const FLAG_CHUNKED: u8 = 0b0000_0010;

/// One fully decoded data-section record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    pub entity_id: String,
    pub tags: Vec<StoredTag>,
    /// Size of `content` before compression.
    pub orig_size: u64,
    /// Size of the `content` field as stored (equal to `orig_size` unless compressed).
    pub stored_size: u64,
    pub flags: u8,
    /// Raw bytes as stored — gzip-compressed when `FLAG_COMPRESSED` is set,
    /// a chunk manifest encoding when `FLAG_CHUNKED` is set, otherwise the
    /// entity's content verbatim.
    pub content: Vec<u8>,
}

impl DataRecord {
    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn is_chunked(&self) -> bool {
        self.flags & FLAG_CHUNKED != 0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_str(&mut buf, &self.entity_id);
        write_tags(&mut buf, &self.tags);
        buf.write_u64::<LittleEndian>(self.orig_size).unwrap();
        buf.write_u64::<LittleEndian>(self.stored_size).unwrap();
        buf.write_u8(self.flags).unwrap();
        write_bytes(&mut buf, &self.content);
        buf
    }

    /// Decode a record from an exact-length buffer (the data-section
    /// writer always knows the length up front from the index entry, so
    /// unlike the WAL there is no separate length prefix here).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let entity_id = read_str(&mut cur)?;
        if entity_id.len() > entitydb_core::limits::MAX_ID_LEN {
            return Err(EntityDbError::corrupt_storage("entity id in data record exceeds max length"));
        }
        let tags = read_tags(&mut cur)?;
        let orig_size = cur.read_u64::<LittleEndian>()?;
        let stored_size = cur.read_u64::<LittleEndian>()?;
        if stored_size > entitydb_core::limits::MAX_RECORD_BYTES {
            return Err(EntityDbError::corrupt_storage("stored_size exceeds max record size"));
        }
        let flags = cur.read_u8()?;
        let content = read_bytes(&mut cur)?;
        if content.len() as u64 != stored_size {
            return Err(EntityDbError::corrupt_storage(format!(
                "declared stored_size {} does not match content length {}",
                stored_size,
                content.len()
            )));
        }
        Ok(DataRecord { entity_id, tags, orig_size, stored_size, flags, content })
    }
}

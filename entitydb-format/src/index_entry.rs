//! Fixed-width entity index and deletion index entries.
//!
//! Both are fixed width so the regions can be binary-searched (entity
//! index, sorted by id) or scanned at a known stride (deletion index)
//! without a separate length table.

use entitydb_core::{limits::{DELETION_INDEX_ENTRY_SIZE, ENTITY_INDEX_ENTRY_SIZE, MAX_ID_LEN}, EntityDbError, Lifecycle, Result, Timestamp};

fn pad_id(id: &str, width: usize) -> Result<[u8; 64]> {
    if width != 64 {
        unreachable!("id field width is fixed at 64 bytes");
    }
    if id.len() > MAX_ID_LEN {
        return Err(EntityDbError::corrupt_input("id", "id exceeds 64 bytes, cannot pad into index entry"));
    }
    let mut out = [0u8; 64];
    out[..id.len()].copy_from_slice(id.as_bytes());
    Ok(out)
}

fn unpad_id(bytes: &[u8; 64]) -> Result<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(64);
    String::from_utf8(bytes[..end].to_vec()).map_err(|e| EntityDbError::corrupt_storage(e.to_string()))
}

/// `{id (64B padded), data_offset (8B), data_length (8B), timestamp (8B)}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityIndexEntry {
    pub entity_id: String,
    pub data_offset: u64,
    pub data_length: u64,
    pub timestamp: Timestamp,
}

impl EntityIndexEntry {
    pub fn encode(&self) -> Result<[u8; ENTITY_INDEX_ENTRY_SIZE]> {
        let mut out = [0u8; ENTITY_INDEX_ENTRY_SIZE];
        let id_bytes = pad_id(&self.entity_id, 64)?;
        out[0..64].copy_from_slice(&id_bytes);
        out[64..72].copy_from_slice(&self.data_offset.to_le_bytes());
        out[72..80].copy_from_slice(&self.data_length.to_le_bytes());
        out[80..88].copy_from_slice(&self.timestamp.as_nanos().to_le_bytes());
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ENTITY_INDEX_ENTRY_SIZE {
            return Err(EntityDbError::corrupt_storage("entity index entry has wrong width"));
        }
        let id_bytes: [u8; 64] = bytes[0..64].try_into().unwrap();
        let entity_id = unpad_id(&id_bytes)?;
        let data_offset = u64::from_le_bytes(bytes[64..72].try_into().unwrap());
        let data_length = u64::from_le_bytes(bytes[72..80].try_into().unwrap());
        let timestamp = Timestamp::from_nanos(u64::from_le_bytes(bytes[80..88].try_into().unwrap()));
        Ok(EntityIndexEntry { entity_id, data_offset, data_length, timestamp })
    }
}

/// `{entity_id, lifecycle_state, timestamp, deleted_by, reason, policy_tag, flags}`,
/// 256 bytes wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionIndexEntry {
    pub entity_id: String,
    pub lifecycle: Lifecycle,
    pub timestamp: Timestamp,
    pub deleted_by: String,
    pub reason: String,
    pub policy_tag: String,
    pub flags: u8,
}

const ID_WIDTH: usize = 64;
const DELETED_BY_WIDTH: usize = 64;
const REASON_WIDTH: usize = 86;
const POLICY_TAG_WIDTH: usize = 32;

fn pad_fixed(s: &str, width: usize, field: &str) -> Result<Vec<u8>> {
    if s.len() > width {
        return Err(EntityDbError::corrupt_input(field, format!("exceeds {} byte fixed width", width)));
    }
    let mut out = vec![0u8; width];
    out[..s.len()].copy_from_slice(s.as_bytes());
    Ok(out)
}

fn unpad_fixed(bytes: &[u8]) -> Result<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec()).map_err(|e| EntityDbError::corrupt_storage(e.to_string()))
}

impl DeletionIndexEntry {
    pub fn encode(&self) -> Result<[u8; DELETION_INDEX_ENTRY_SIZE]> {
        let mut out = [0u8; DELETION_INDEX_ENTRY_SIZE];
        let mut pos = 0;
        out[pos..pos + ID_WIDTH].copy_from_slice(&pad_fixed(&self.entity_id, ID_WIDTH, "entity_id")?);
        pos += ID_WIDTH;
        out[pos] = self.lifecycle.as_u8();
        pos += 1;
        out[pos..pos + 8].copy_from_slice(&self.timestamp.as_nanos().to_le_bytes());
        pos += 8;
        out[pos..pos + DELETED_BY_WIDTH].copy_from_slice(&pad_fixed(&self.deleted_by, DELETED_BY_WIDTH, "deleted_by")?);
        pos += DELETED_BY_WIDTH;
        out[pos..pos + REASON_WIDTH].copy_from_slice(&pad_fixed(&self.reason, REASON_WIDTH, "reason")?);
        pos += REASON_WIDTH;
        out[pos..pos + POLICY_TAG_WIDTH].copy_from_slice(&pad_fixed(&self.policy_tag, POLICY_TAG_WIDTH, "policy_tag")?);
        pos += POLICY_TAG_WIDTH;
        out[pos] = self.flags;
        pos += 1;
        debug_assert_eq!(pos, DELETION_INDEX_ENTRY_SIZE);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DELETION_INDEX_ENTRY_SIZE {
            return Err(EntityDbError::corrupt_storage("deletion index entry has wrong width"));
        }
        let mut pos = 0;
        let entity_id = unpad_fixed(&bytes[pos..pos + ID_WIDTH])?;
        pos += ID_WIDTH;
        let lifecycle = Lifecycle::from_u8(bytes[pos])
            .ok_or_else(|| EntityDbError::corrupt_storage("unknown lifecycle byte in deletion index entry"))?;
        pos += 1;
        let timestamp = Timestamp::from_nanos(u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap()));
        pos += 8;
        let deleted_by = unpad_fixed(&bytes[pos..pos + DELETED_BY_WIDTH])?;
        pos += DELETED_BY_WIDTH;
        let reason = unpad_fixed(&bytes[pos..pos + REASON_WIDTH])?;
        pos += REASON_WIDTH;
        let policy_tag = unpad_fixed(&bytes[pos..pos + POLICY_TAG_WIDTH])?;
        pos += POLICY_TAG_WIDTH;
        let flags = bytes[pos];
        Ok(DeletionIndexEntry { entity_id, lifecycle, timestamp, deleted_by, reason, policy_tag, flags })
    }
}

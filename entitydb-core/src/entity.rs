//! The entity data model.
//!
//! `Entity` is the single first-class record EntityDB stores. Tags are
//! modeled internally as structured `(timestamp, key, value)` triples
//! rather than the legacy `TIMESTAMP|key:value` string the on-disk format
//! uses — the string form is an encoding detail confined to
//! `entitydb-format`, not something the rest of the system reasons about.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EntityDbError, Result};
use crate::limits::MAX_ID_LEN;
use crate::timestamp::Timestamp;

/// Opaque entity identifier, at most [`MAX_ID_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(String);

impl EntityId {
    /// Validate and wrap a caller-supplied or generated id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(EntityDbError::corrupt_input("id", "entity id must not be empty"));
        }
        if id.len() > MAX_ID_LEN {
            return Err(EntityDbError::corrupt_input(
                "id",
                format!("entity id length {} exceeds maximum {}", id.len(), MAX_ID_LEN),
            ));
        }
        Ok(EntityId(id))
    }

    /// Generate a fresh random id (UUID-v4-shaped, no external dependency).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        // A simple time+counter based fill is enough for uniqueness within
        // one process; callers needing cross-process guarantees should
        // supply their own id.
        let nanos = Timestamp::now().as_nanos();
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = ((nanos >> (8 * (i % 8))) ^ (i as u64)) as u8;
        }
        EntityId(hex_encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// A single structured tag operation as it is stored in the timeline: the
/// logical `key:value` pair plus the nanosecond timestamp it was written
/// at. This is the internal representation; rendering to the legacy
/// `TIMESTAMP|key:value` string happens only at the on-disk boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTag {
    pub timestamp: Timestamp,
    pub key: String,
    pub value: String,
}

impl StoredTag {
    pub fn new(timestamp: Timestamp, logical_tag: &str) -> Result<Self> {
        let (key, value) = split_logical_tag(logical_tag)?;
        Ok(StoredTag { timestamp, key, value })
    }

    /// The `key:value` portion without timestamp.
    pub fn logical_tag(&self) -> String {
        format!("{}:{}", self.key, self.value)
    }
}

/// Split `key:value` into its two parts. The first `:` is the separator;
/// values are free to contain further colons.
pub fn split_logical_tag(logical_tag: &str) -> Result<(String, String)> {
    match logical_tag.split_once(':') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(EntityDbError::corrupt_input(
            "tag",
            format!("tag '{}' is missing a logical key:value portion", logical_tag),
        )),
    }
}

/// Lifecycle state of an entity. See spec.md §3 "Lifecycle".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    SoftDeleted,
    Archived,
    Purged,
}

impl Lifecycle {
    pub fn as_u8(self) -> u8 {
        match self {
            Lifecycle::Active => 0,
            Lifecycle::SoftDeleted => 1,
            Lifecycle::Archived => 2,
            Lifecycle::Purged => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Lifecycle::Active),
            1 => Some(Lifecycle::SoftDeleted),
            2 => Some(Lifecycle::Archived),
            3 => Some(Lifecycle::Purged),
            _ => None,
        }
    }

    /// Whether the entity is still readable via temporal queries.
    pub fn is_temporally_readable(self) -> bool {
        !matches!(self, Lifecycle::Purged)
    }

    /// Whether the entity appears in current-state views.
    pub fn is_current(self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

/// The public, current-state projection of an entity: tags deduplicated
/// by key (newest timestamp wins) and content fully reassembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: EntityId,
    pub tags: Vec<String>,
    pub content: Vec<u8>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Entity {
    /// Project a raw timeline of stored tags into deduplicated current
    /// tags, keeping only the newest timestamp per key.
    pub fn project_current_tags(raw: &[StoredTag]) -> Vec<String> {
        let mut newest: BTreeMap<&str, &StoredTag> = BTreeMap::new();
        for tag in raw {
            match newest.get(tag.key.as_str()) {
                Some(existing) if existing.timestamp >= tag.timestamp => {}
                _ => {
                    newest.insert(&tag.key, tag);
                }
            }
        }
        newest.values().map(|t| t.logical_tag()).collect()
    }

    /// Project a raw timeline as of a given instant: keep, per key, the
    /// newest tag whose timestamp is `<= at`.
    pub fn project_as_of(raw: &[StoredTag], at: Timestamp) -> Vec<String> {
        let filtered: Vec<&StoredTag> = raw.iter().filter(|t| t.timestamp <= at).collect();
        let mut newest: BTreeMap<&str, &StoredTag> = BTreeMap::new();
        for tag in filtered {
            match newest.get(tag.key.as_str()) {
                Some(existing) if existing.timestamp >= tag.timestamp => {}
                _ => {
                    newest.insert(&tag.key, tag);
                }
            }
        }
        newest.values().map(|t| t.logical_tag()).collect()
    }
}

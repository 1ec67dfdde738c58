//! The single writer path: compression, autochunking, and construction
//! of the `DataRecord`/`EntityIndexEntry` pair for one entity mutation
//! (spec.md §4.3, §4.4).
//!
//! A single `EntityDbFile` is expected to hold one `Writer` for its
//! entire lifetime; nothing here is safe to call from more than one
//! thread concurrently without external locking (spec.md §5: "single
//! writer, many readers").

use std::io::{Read as _, Write as _};

use entitydb_core::{limits::MAX_ID_LEN, EntityDbError, EntityId, Result, StoredTag};
use entitydb_format::{DataRecord, FLAG_CHUNKED, FLAG_COMPRESSED};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

pub struct PreparedWrite {
    pub primary: DataRecord,
    /// Child chunk records produced when content exceeded the chunk
    /// threshold. Each carries its own `chunk:parent`/`chunk:seq`/
    /// `chunk:total` tags per spec.md §4.4.
    pub chunks: Vec<(EntityId, DataRecord)>,
}

fn gzip(content: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    encoder.finish().map_err(EntityDbError::from)
}

fn gunzip(content: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(content);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Recover the original content bytes stored in a `DataRecord`,
/// decompressing if `FLAG_COMPRESSED` is set. Does not reassemble
/// chunked records — callers holding a chunk manifest must gather and
/// concatenate the child records themselves (spec.md §4.4).
pub fn decode_record_content(record: &DataRecord) -> Result<Vec<u8>> {
    if record.is_compressed() {
        gunzip(&record.content)
    } else {
        Ok(record.content.clone())
    }
}

/// Build the on-disk record(s) for one entity write, applying
/// compression and chunking thresholds.
pub fn prepare_write(
    entity_id: &str,
    tags: &[StoredTag],
    content: &[u8],
    compress_threshold_bytes: u64,
    chunk_threshold_bytes: u64,
) -> Result<PreparedWrite> {
    if content.len() as u64 >= chunk_threshold_bytes {
        return prepare_chunked_write(entity_id, tags, content, compress_threshold_bytes, chunk_threshold_bytes);
    }
    let record = encode_single(entity_id, tags, content, compress_threshold_bytes)?;
    Ok(PreparedWrite { primary: record, chunks: Vec::new() })
}

fn encode_single(
    entity_id: &str,
    tags: &[StoredTag],
    content: &[u8],
    compress_threshold_bytes: u64,
) -> Result<DataRecord> {
    let orig_size = content.len() as u64;
    let (stored, flags) = if orig_size >= compress_threshold_bytes {
        (gzip(content)?, FLAG_COMPRESSED)
    } else {
        (content.to_vec(), 0u8)
    };
    Ok(DataRecord {
        entity_id: entity_id.to_string(),
        tags: tags.to_vec(),
        orig_size,
        stored_size: stored.len() as u64,
        flags,
        content: stored,
    })
}

fn prepare_chunked_write(
    entity_id: &str,
    tags: &[StoredTag],
    content: &[u8],
    compress_threshold_bytes: u64,
    chunk_threshold_bytes: u64,
) -> Result<PreparedWrite> {
    let chunk_size = chunk_threshold_bytes.max(1) as usize;
    let pieces: Vec<&[u8]> = content.chunks(chunk_size).collect();
    let total = pieces.len();

    let mut chunks = Vec::with_capacity(total);
    for (seq, piece) in pieces.iter().enumerate() {
        let child_id_str = format!("{}.chunk{}", entity_id, seq);
        if child_id_str.len() > MAX_ID_LEN {
            return Err(EntityDbError::corrupt_input("entity_id", "id too long to derive chunk child ids"));
        }
        let child_id = EntityId::new(child_id_str)?;
        let child_tags = vec![
            StoredTag {
                timestamp: tags.first().map(|t| t.timestamp).unwrap_or(entitydb_core::Timestamp::from_nanos(0)),
                key: "chunk:parent".to_string(),
                value: entity_id.to_string(),
            },
            StoredTag {
                timestamp: tags.first().map(|t| t.timestamp).unwrap_or(entitydb_core::Timestamp::from_nanos(0)),
                key: "chunk:seq".to_string(),
                value: seq.to_string(),
            },
            StoredTag {
                timestamp: tags.first().map(|t| t.timestamp).unwrap_or(entitydb_core::Timestamp::from_nanos(0)),
                key: "chunk:total".to_string(),
                value: total.to_string(),
            },
        ];
        let mut record = encode_single(child_id.as_str(), &child_tags, piece, compress_threshold_bytes)?;
        record.flags |= FLAG_CHUNKED;
        chunks.push((child_id, record));
    }

    let manifest_content = total.to_string().into_bytes();
    let mut primary = encode_single(entity_id, tags, &manifest_content, compress_threshold_bytes)?;
    primary.flags |= FLAG_CHUNKED;
    Ok(PreparedWrite { primary, chunks })
}

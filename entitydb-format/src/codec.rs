//! Shared length-prefixed primitive encoders used by every region of the
//! unified file format. Kept in one place so the WAL record, data-section
//! record, and index entry codecs agree on wire representation.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use entitydb_core::{EntityDbError, Result, StoredTag, Timestamp};

pub fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.write_u32::<LittleEndian>(s.len() as u32).unwrap();
    buf.extend_from_slice(s.as_bytes());
}

pub fn read_str(cur: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cur.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| EntityDbError::corrupt_storage(e.to_string()))
}

pub fn write_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    buf.write_u32::<LittleEndian>(b.len() as u32).unwrap();
    buf.extend_from_slice(b);
}

pub fn read_bytes(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = cur.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)?;
    Ok(bytes)
}

pub fn write_tag(buf: &mut Vec<u8>, tag: &StoredTag) {
    buf.write_u64::<LittleEndian>(tag.timestamp.as_nanos()).unwrap();
    write_str(buf, &tag.key);
    write_str(buf, &tag.value);
}

pub fn read_tag(cur: &mut Cursor<&[u8]>) -> Result<StoredTag> {
    let nanos = cur.read_u64::<LittleEndian>()?;
    let key = read_str(cur)?;
    let value = read_str(cur)?;
    Ok(StoredTag { timestamp: Timestamp::from_nanos(nanos), key, value })
}

pub fn write_tags(buf: &mut Vec<u8>, tags: &[StoredTag]) {
    buf.write_u32::<LittleEndian>(tags.len() as u32).unwrap();
    for tag in tags {
        write_tag(buf, tag);
    }
}

pub fn read_tags(cur: &mut Cursor<&[u8]>) -> Result<Vec<StoredTag>> {
    let count = cur.read_u32::<LittleEndian>()? as usize;
    if count > entitydb_core::limits::MAX_TAG_COUNT {
        return Err(EntityDbError::corrupt_storage(format!(
            "tag count {} exceeds maximum {}",
            count,
            entitydb_core::limits::MAX_TAG_COUNT
        )));
    }
    let mut tags = Vec::with_capacity(count);
    for _ in 0..count {
        tags.push(read_tag(cur)?);
    }
    Ok(tags)
}

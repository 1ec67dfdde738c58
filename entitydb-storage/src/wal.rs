//! The in-file write-ahead log region (spec.md §4.1, §4.2).
//!
//! Unlike the teacher's segment-per-file WAL, EntityDB's WAL lives inside
//! one contiguous region of the unified file. Records are appended with
//! `fsync` before the write is acknowledged; `replay` walks the region
//! from the start, stopping at the first record that fails to decode
//! (truncated tail from a torn write) rather than treating it as fatal.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use entitydb_core::Result;
use entitydb_format::WalRecord;

/// Outcome of scanning the WAL region during recovery.
pub struct ReplayResult {
    pub records: Vec<WalRecord>,
    /// Bytes of the region that contained valid, decodable records.
    pub valid_bytes: u64,
    /// Set when the scan stopped early because of a decode failure
    /// (expected after a crash mid-append).
    pub truncated: bool,
}

/// Appends records to the WAL region of an open file and fsyncs after
/// every write, per the single-writer durability contract (spec.md §5).
pub struct WalAppender<'a> {
    file: &'a File,
    region_offset: u64,
    next_write_offset: u64,
}

impl<'a> WalAppender<'a> {
    pub fn new(file: &'a File, region_offset: u64, region_used_bytes: u64) -> Self {
        Self { file, region_offset, next_write_offset: region_offset + region_used_bytes }
    }

    /// Append one record, fsync, and return the new total used size of
    /// the WAL region (bytes from `region_offset`).
    pub fn append(&mut self, record: &WalRecord) -> Result<u64> {
        let bytes = record.encode();
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(self.next_write_offset))?;
        file.write_all(&bytes)?;
        file.sync_data()?;
        self.next_write_offset += bytes.len() as u64;
        Ok(self.next_write_offset - self.region_offset)
    }
}

/// Decode every record in `region_bytes`, stopping at the first one that
/// fails to parse (covers both corruption and a torn trailing write).
pub fn replay(region_bytes: &[u8]) -> ReplayResult {
    let mut records = Vec::new();
    let mut pos = 0usize;
    let mut truncated = false;
    while pos < region_bytes.len() {
        match WalRecord::decode(&region_bytes[pos..]) {
            Ok((record, consumed)) => {
                records.push(record);
                pos += consumed;
            }
            Err(_) => {
                truncated = pos != region_bytes.len();
                break;
            }
        }
    }
    ReplayResult { records, valid_bytes: pos as u64, truncated }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::StoredTag;
    use entitydb_core::Timestamp;
    use entitydb_format::WalPayload;
    use tempfile::tempfile;

    fn record(seq: u64) -> WalRecord {
        WalRecord {
            sequence: seq,
            payload: WalPayload::AddTag {
                entity_id: "e1".into(),
                tag: StoredTag { timestamp: Timestamp::from_nanos(seq), key: "k".into(), value: "v".into() },
            },
        }
    }

    #[test]
    fn append_then_replay_roundtrips() {
        let file = tempfile().unwrap();
        file.set_len(1024).unwrap();
        let mut appender = WalAppender::new(&file, 0, 0);
        let mut used = 0;
        for seq in 0..3 {
            used = appender.append(&record(seq)).unwrap();
        }

        let mut buf = vec![0u8; used as usize];
        use std::os::unix::fs::FileExt;
        file.read_exact_at(&mut buf, 0).unwrap();
        let result = replay(&buf);
        assert_eq!(result.records.len(), 3);
        assert!(!result.truncated);
        assert_eq!(result.valid_bytes, used);
    }

    #[test]
    fn replay_stops_at_torn_tail() {
        let rec = record(0).encode();
        let mut buf = rec.clone();
        buf.truncate(rec.len() - 2); // chop off part of the CRC
        let result = replay(&buf);
        assert!(result.records.is_empty());
        assert!(result.truncated);
        assert_eq!(result.valid_bytes, 0);
    }

    #[test]
    fn replay_keeps_valid_prefix_before_torn_tail() {
        let mut buf = record(0).encode();
        let mut second = record(1).encode();
        second.truncate(second.len() - 2);
        buf.extend_from_slice(&second);
        let result = replay(&buf);
        assert_eq!(result.records.len(), 1);
        assert!(result.truncated);
    }
}

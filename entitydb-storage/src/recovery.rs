//! Startup recovery: replay the WAL region, bound how much corruption is
//! tolerated, and report what happened (spec.md §4.9, §7).

use entitydb_format::{FileHeader, WalRecord};
use tracing::warn;

use crate::wal::replay;

/// Summary of one recovery pass, surfaced to callers for observability
/// and tests rather than silently swallowed.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub records_replayed: usize,
    pub wal_truncated: bool,
    pub bytes_discarded: u64,
}

/// Replay the WAL region found in `wal_bytes` against the header's
/// recorded sequence, returning records in order and a report. A torn
/// tail from a crash mid-append is expected and not an error; it is
/// simply excluded from the returned records.
pub fn recover_wal(header: &FileHeader, wal_bytes: &[u8]) -> (Vec<WalRecord>, RecoveryReport) {
    let result = replay(wal_bytes);
    let discarded = wal_bytes.len() as u64 - result.valid_bytes;
    if result.truncated {
        warn!(
            wal_sequence = header.wal_sequence,
            bytes_discarded = discarded,
            "WAL replay stopped at a torn or corrupt tail record"
        );
    }
    let report = RecoveryReport {
        records_replayed: result.records.len(),
        wal_truncated: result.truncated,
        bytes_discarded: discarded,
    };
    (result.records, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{StoredTag, Timestamp};
    use entitydb_format::WalPayload;

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
    fn recovers_clean_wal_fully() {
        let header = FileHeader::new_empty();
        let mut buf = Vec::new();
        buf.extend(record(0).encode());
        buf.extend(record(1).encode());
        let (records, report) = recover_wal(&header, &buf);
        assert_eq!(records.len(), 2);
        assert!(!report.wal_truncated);
        assert_eq!(report.bytes_discarded, 0);
    }

    #[test]
    fn recovers_valid_prefix_and_reports_truncation() {
        let header = FileHeader::new_empty();
        let mut buf = record(0).encode();
        let mut torn = record(1).encode();
        torn.truncate(torn.len() - 3);
        buf.extend(torn);
        let (records, report) = recover_wal(&header, &buf);
        assert_eq!(records.len(), 1);
        assert!(report.wal_truncated);
        assert!(report.bytes_discarded > 0);
    }
}

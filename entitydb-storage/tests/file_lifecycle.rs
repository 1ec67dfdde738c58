//! End-to-end exercise of the unified file across a full
//! create -> append -> checkpoint -> reopen cycle, without any of the
//! in-memory working-set logic `entitydb-engine` layers on top (spec.md
//! §4.1, §4.9).

use entitydb_core::{Limits, StoredTag, Timestamp};
use entitydb_format::{WalPayload, WalRecord};
use entitydb_storage::{run_checkpoint, CheckpointInput, EntityDbFile};
use tempfile::tempdir;

#[test]
fn checkpoint_resets_wal_and_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lifecycle.edb");

    {
        let db = EntityDbFile::create_new(&path, Limits::default()).unwrap();
        let record = WalRecord {
            sequence: 1,
            payload: WalPayload::Create {
                entity_id: "e1".into(),
                tags: vec![StoredTag { timestamp: Timestamp::from_nanos(1), key: "k".into(), value: "v".into() }],
                content: b"hello".to_vec(),
            },
        };
        db.append_wal_record(&record).unwrap();

        let handle = db.try_clone_handle().unwrap();
        let input = CheckpointInput {
            data_bytes: b"hello".to_vec(),
            entity_index_bytes: vec![],
            tag_dict_bytes: vec![],
            deletion_index_bytes: vec![],
            entity_count: 1,
            wal_sequence: 1,
        };
        let report = run_checkpoint(&handle, &db.header_sync, &db.reader_pool, input).unwrap();
        assert_eq!(report.checkpoint_sequence, 1);
        // The checkpoint folded the WAL into the data region, so its
        // region is now empty.
        assert_eq!(db.header_sync.read().wal.size, 0);
    }

    // A second session sees the checkpoint and no records left to replay.
    let (db, records, report) = EntityDbFile::open_existing(&path, Limits::default()).unwrap();
    assert!(records.is_empty());
    assert_eq!(report.records_replayed, 0);
    assert_eq!(db.header_sync.read().checkpoint_sequence, 1);
    assert_eq!(db.header_sync.read().entity_count, 1);
    let data = db.read_region(db.header_sync.read().data).unwrap();
    assert_eq!(data, b"hello");
}

#[test]
fn wal_tail_after_checkpoint_is_replayed_without_reprocessing_folded_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lifecycle2.edb");

    {
        let db = EntityDbFile::create_new(&path, Limits::default()).unwrap();
        let create = WalRecord {
            sequence: 1,
            payload: WalPayload::Create { entity_id: "e1".into(), tags: vec![], content: b"v1".to_vec() },
        };
        db.append_wal_record(&create).unwrap();

        let handle = db.try_clone_handle().unwrap();
        let input = CheckpointInput {
            data_bytes: b"v1".to_vec(),
            entity_index_bytes: vec![],
            tag_dict_bytes: vec![],
            deletion_index_bytes: vec![],
            entity_count: 1,
            wal_sequence: 1,
        };
        run_checkpoint(&handle, &db.header_sync, &db.reader_pool, input).unwrap();

        // Written after the checkpoint, so it must be the only record
        // replayed on the next open.
        let update = WalRecord {
            sequence: 2,
            payload: WalPayload::AddTag {
                entity_id: "e1".into(),
                tag: StoredTag { timestamp: Timestamp::from_nanos(2), key: "status".into(), value: "active".into() },
            },
        };
        db.append_wal_record(&update).unwrap();
    }

    let (_db, records, report) = EntityDbFile::open_existing(&path, Limits::default()).unwrap();
    assert_eq!(report.records_replayed, 1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sequence, 2);
}

//! Checkpoint protocol: fold the WAL into the data/index regions, write
//! a validated header, and invalidate stale reader handles (spec.md
//! §4.9, seven-step protocol).
//!
//! Ordering matters: the header is only swapped to point at the new
//! regions after they are fully written and fsynced, and the reader
//! pool is only invalidated after the header swap commits, so a reader
//! acquired mid-checkpoint either sees the fully-old or fully-new view,
//! never a torn one.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use entitydb_core::Result;
use entitydb_format::{FileHeader, Region, HEADER_SIZE};
use tracing::{info, instrument};

use crate::header_sync::HeaderSync;
use crate::reader_pool::ReaderPool;

/// Inputs folded into a checkpoint: the data section bytes and entity
/// index bytes rebuilt from current state, ready to be written
/// contiguously after the header.
pub struct CheckpointInput {
    pub data_bytes: Vec<u8>,
    pub entity_index_bytes: Vec<u8>,
    pub tag_dict_bytes: Vec<u8>,
    pub deletion_index_bytes: Vec<u8>,
    pub entity_count: u64,
    pub wal_sequence: u64,
}

pub struct CheckpointReport {
    pub checkpoint_sequence: u64,
    pub new_total_file_size: u64,
}

#[instrument(skip(file, header_sync, reader_pool, input))]
pub fn run_checkpoint(
    file: &File,
    header_sync: &HeaderSync,
    reader_pool: &ReaderPool,
    input: CheckpointInput,
) -> Result<CheckpointReport> {
    header_sync.snapshot_before()?;

    let data_region = Region { offset: HEADER_SIZE as u64, size: input.data_bytes.len() as u64 };
    let tag_dict_region = Region { offset: data_region.end(), size: input.tag_dict_bytes.len() as u64 };
    let entity_index_region = Region { offset: tag_dict_region.end(), size: input.entity_index_bytes.len() as u64 };
    let deletion_index_region =
        Region { offset: entity_index_region.end(), size: input.deletion_index_bytes.len() as u64 };
    let wal_region = Region { offset: deletion_index_region.end(), size: 0 };
    let total_file_size = wal_region.end();

    let prior = header_sync.read();
    let new_header = FileHeader {
        format_version: prior.format_version,
        total_file_size,
        wal: wal_region,
        data: data_region,
        tag_dict: tag_dict_region,
        entity_index: entity_index_region,
        deletion_index: deletion_index_region,
        entity_count: input.entity_count,
        last_modified_unix_secs: entitydb_core::Timestamp::now().as_nanos() / 1_000_000_000,
        wal_sequence: input.wal_sequence,
        checkpoint_sequence: prior.checkpoint_sequence + 1,
    };

    let mut writer = file.try_clone()?;
    writer.seek(SeekFrom::Start(data_region.offset))?;
    writer.write_all(&input.data_bytes)?;
    writer.write_all(&input.tag_dict_bytes)?;
    writer.write_all(&input.entity_index_bytes)?;
    writer.write_all(&input.deletion_index_bytes)?;
    writer.sync_data()?;

    header_sync.propose(new_header.clone())?;
    writer.seek(SeekFrom::Start(0))?;
    writer.write_all(&new_header.to_bytes())?;
    writer.sync_all()?;
    writer.set_len(total_file_size)?;

    let mut readback = vec![0u8; HEADER_SIZE];
    use std::os::unix::fs::FileExt;
    file.read_exact_at(&mut readback, 0)?;
    let parsed = FileHeader::from_bytes(&readback)?;

    header_sync.validate_after(&parsed, total_file_size)?;
    header_sync.finish()?;
    reader_pool.invalidate();

    info!(checkpoint_sequence = new_header.checkpoint_sequence, total_file_size, "checkpoint committed");

    Ok(CheckpointReport { checkpoint_sequence: new_header.checkpoint_sequence, new_total_file_size: total_file_size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_format::FileHeader as Header;
    use tempfile::NamedTempFile;

    #[test]
    fn checkpoint_lays_out_regions_without_overlap_and_resets_wal() {
        let tmp = NamedTempFile::new().unwrap();
        let file = tmp.reopen().unwrap();
        file.set_len(HEADER_SIZE as u64).unwrap();
        let mut header = Header::new_empty();
        header.total_file_size = HEADER_SIZE as u64;
        let header_bytes = header.to_bytes();
        {
            let mut w = file.try_clone().unwrap();
            w.seek(SeekFrom::Start(0)).unwrap();
            w.write_all(&header_bytes).unwrap();
        }
        let header_sync = HeaderSync::new(header);
        let reader_pool = ReaderPool::new(tmp.path(), 4, 1);

        let input = CheckpointInput {
            data_bytes: vec![1, 2, 3, 4],
            entity_index_bytes: vec![0; 88],
            tag_dict_bytes: vec![],
            deletion_index_bytes: vec![],
            entity_count: 1,
            wal_sequence: 5,
        };
        let report = run_checkpoint(&file, &header_sync, &reader_pool, input).unwrap();
        assert!(report.new_total_file_size > HEADER_SIZE as u64);
        let final_header = header_sync.read();
        assert_eq!(final_header.wal.size, 0);
        assert_eq!(final_header.checkpoint_sequence, 1);
        assert_eq!(final_header.entity_count, 1);
    }

    #[test]
    fn checkpoint_invalidates_reader_pool() {
        let tmp = NamedTempFile::new().unwrap();
        let file = tmp.reopen().unwrap();
        file.set_len(HEADER_SIZE as u64).unwrap();
        let mut header = Header::new_empty();
        header.total_file_size = HEADER_SIZE as u64;
        {
            let mut w = file.try_clone().unwrap();
            w.write_all(&header.to_bytes()).unwrap();
        }
        let header_sync = HeaderSync::new(header);
        let reader_pool = ReaderPool::new(tmp.path(), 4, 1);
        reader_pool.warm().unwrap();
        let gen_before = reader_pool.generation();

        let input = CheckpointInput {
            data_bytes: vec![],
            entity_index_bytes: vec![],
            tag_dict_bytes: vec![],
            deletion_index_bytes: vec![],
            entity_count: 0,
            wal_sequence: 0,
        };
        run_checkpoint(&file, &header_sync, &reader_pool, input).unwrap();
        assert_eq!(reader_pool.generation(), gen_before + 1);
    }
}

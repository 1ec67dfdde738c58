//! Three-layer checkpoint protection for the file header (spec.md §4.9).
//!
//! A checkpoint never overwrites the header in place without a fallback:
//! the previously-stable header is kept as a snapshot until the new one
//! has been written and read back, so a crash mid-checkpoint always
//! leaves a header `from_bytes` can parse.
//!
//! State machine: `Stable -> Snapshotted -> Validating -> Committed`
//! on success, or `Stable -> Snapshotted -> Validating -> Restored` if
//! validation fails and the old header is put back.

use parking_lot::RwLock;

use entitydb_core::{EntityDbError, Result};
use entitydb_format::FileHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    Stable,
    Snapshotted,
    Validating,
    Committed,
    Restored,
}

struct Inner {
    current: FileHeader,
    snapshot: Option<FileHeader>,
    state: HeaderState,
}

pub struct HeaderSync {
    inner: RwLock<Inner>,
}

impl HeaderSync {
    pub fn new(initial: FileHeader) -> Self {
        Self { inner: RwLock::new(Inner { current: initial, snapshot: None, state: HeaderState::Stable }) }
    }

    pub fn read(&self) -> FileHeader {
        self.inner.read().current.clone()
    }

    pub fn state(&self) -> HeaderState {
        self.inner.read().state
    }

    /// Apply an in-memory header mutation outside of a checkpoint (e.g.
    /// bumping `entity_count`/`wal_sequence` after a WAL append). Only
    /// valid while `Stable`.
    pub fn update(&self, f: impl FnOnce(&mut FileHeader)) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != HeaderState::Stable {
            return Err(EntityDbError::corrupt_storage("header updated while a checkpoint is in flight"));
        }
        f(&mut inner.current);
        Ok(())
    }

    /// Snapshot the current header before checkpointing begins.
    pub fn snapshot_before(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != HeaderState::Stable {
            return Err(EntityDbError::corrupt_storage("checkpoint already in flight"));
        }
        inner.snapshot = Some(inner.current.clone());
        inner.state = HeaderState::Snapshotted;
        Ok(())
    }

    /// Install the checkpoint's proposed new header and move into the
    /// validating state. The caller is responsible for durably writing
    /// `new_header` to disk (with fsync) before calling `validate_after`.
    pub fn propose(&self, new_header: FileHeader) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != HeaderState::Snapshotted {
            return Err(EntityDbError::corrupt_storage("propose called outside Snapshotted state"));
        }
        inner.current = new_header;
        inner.state = HeaderState::Validating;
        Ok(())
    }

    /// Validate the header the caller just wrote and read back from disk.
    /// On success the snapshot is dropped and the new header becomes
    /// stable; on failure the snapshot is restored as the in-memory
    /// header and the caller must rewrite it to disk.
    pub fn validate_after(&self, read_back: &FileHeader, actual_file_size: u64) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != HeaderState::Validating {
            return Err(EntityDbError::corrupt_storage("validate_after called outside Validating state"));
        }
        match read_back.validate(actual_file_size) {
            Ok(()) if *read_back == inner.current => {
                inner.snapshot = None;
                inner.state = HeaderState::Committed;
                Ok(())
            }
            _ => {
                let restored = inner.snapshot.take().ok_or_else(|| {
                    EntityDbError::unrecoverable("checkpoint validation failed with no snapshot to restore")
                })?;
                inner.current = restored;
                inner.state = HeaderState::Restored;
                Err(EntityDbError::corrupt_storage("checkpoint header failed validation, restored prior header"))
            }
        }
    }

    /// Return to `Stable` after a `Committed` or `Restored` outcome has
    /// been durably persisted (restored case requires the caller to have
    /// rewritten the restored header to disk first).
    pub fn finish(&self) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.state {
            HeaderState::Committed | HeaderState::Restored => {
                inner.state = HeaderState::Stable;
                Ok(())
            }
            other => Err(EntityDbError::corrupt_storage(format!("finish called from state {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_format::{FileHeader, Region};

    fn sample_header() -> FileHeader {
        let mut h = FileHeader::new_empty();
        h.total_file_size = 4096;
        h.data = Region { offset: 128, size: 100 };
        h
    }

    #[test]
    fn successful_checkpoint_commits_and_returns_to_stable() {
        let sync = HeaderSync::new(sample_header());
        sync.snapshot_before().unwrap();
        let mut next = sync.read();
        next.entity_count += 1;
        sync.propose(next.clone()).unwrap();
        sync.validate_after(&next, 4096).unwrap();
        assert_eq!(sync.state(), HeaderState::Committed);
        sync.finish().unwrap();
        assert_eq!(sync.state(), HeaderState::Stable);
        assert_eq!(sync.read().entity_count, 1);
    }

    #[test]
    fn failed_validation_restores_prior_header() {
        let original = sample_header();
        let sync = HeaderSync::new(original.clone());
        sync.snapshot_before().unwrap();
        let mut bad = sync.read();
        bad.entity_count += 1;
        sync.propose(bad.clone()).unwrap();

        let mut corrupted_read_back = bad.clone();
        corrupted_read_back.total_file_size = 0; // fails validate()
        let err = sync.validate_after(&corrupted_read_back, 4096);
        assert!(err.is_err());
        assert_eq!(sync.state(), HeaderState::Restored);
        assert_eq!(sync.read(), original);
        sync.finish().unwrap();
        assert_eq!(sync.state(), HeaderState::Stable);
    }

    #[test]
    fn update_rejected_while_checkpoint_in_flight() {
        let sync = HeaderSync::new(sample_header());
        sync.snapshot_before().unwrap();
        assert!(sync.update(|h| h.entity_count += 1).is_err());
    }

    #[test]
    fn snapshot_before_rejected_when_already_in_flight() {
        let sync = HeaderSync::new(sample_header());
        sync.snapshot_before().unwrap();
        assert!(sync.snapshot_before().is_err());
    }
}

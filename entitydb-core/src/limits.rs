//! Fixed structural limits and configurable size thresholds.
//!
//! The structural constants (`MAX_ID_LEN`, `MAX_TAG_COUNT`, ...) are part of
//! the on-disk format contract and never change without a format version
//! bump. `Limits` bundles the configurable thresholds enumerated in
//! spec.md §6; defaults match the spec exactly.

/// Maximum entity id length in bytes (spec.md §3).
pub const MAX_ID_LEN: usize = 64;

/// Maximum number of tags on a single entity (spec.md §4.11).
pub const MAX_TAG_COUNT: usize = 10_000;

/// Maximum size of any single data-section record (spec.md §4.5, §4.11).
pub const MAX_RECORD_BYTES: u64 = 100 * 1024 * 1024;

/// Maximum size of a single WAL entry accepted during replay (spec.md §4.11).
pub const MAX_WAL_ENTRY_BYTES: u64 = 100 * 1024 * 1024;

/// Fixed width of one entity index entry on disk (spec.md §4.1).
pub const ENTITY_INDEX_ENTRY_SIZE: usize = 64 + 8 + 8 + 8;

/// Fixed width of one deletion index entry on disk (spec.md §4.1).
pub const DELETION_INDEX_ENTRY_SIZE: usize = 256;

/// Number of shards in the tag index (spec.md §4.6).
pub const TAG_INDEX_SHARD_COUNT: usize = 256;

/// Configurable size thresholds consumed at startup (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Content at or above this size is gzip-compressed before storage.
    pub compress_threshold_bytes: u64,
    /// Content at or above this size is autochunked into child entities.
    pub chunk_threshold_bytes: u64,
    /// Checkpoint is triggered after this many operations since the last one.
    pub wal_checkpoint_ops: u64,
    /// Checkpoint is triggered after this many seconds have elapsed.
    pub wal_checkpoint_interval_secs: u64,
    /// Checkpoint is triggered once the in-file WAL region reaches this size.
    pub wal_checkpoint_size_bytes: u64,
    /// WAL size at which a warning-level event is logged.
    pub wal_warn_size_bytes: u64,
    /// Maximum concurrently open read-only file handles.
    pub reader_pool_max: usize,
    /// Handles kept warm even when idle.
    pub reader_pool_min: usize,
    /// Memory guardian soft threshold, as a percentage of the configured limit.
    pub memory_guardian_soft_pct: u8,
    /// Memory guardian hard threshold, as a percentage of the configured limit.
    pub memory_guardian_hard_pct: u8,
    /// Hard cap enforced on every data-section record.
    pub max_record_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            compress_threshold_bytes: 1024,
            chunk_threshold_bytes: 4 * 1024 * 1024,
            wal_checkpoint_ops: 1000,
            wal_checkpoint_interval_secs: 5 * 60,
            wal_checkpoint_size_bytes: 100 * 1024 * 1024,
            wal_warn_size_bytes: 50 * 1024 * 1024,
            reader_pool_max: 8,
            reader_pool_min: 2,
            memory_guardian_soft_pct: 80,
            memory_guardian_hard_pct: 90,
            max_record_bytes: MAX_RECORD_BYTES,
        }
    }
}

impl Limits {
    /// Small thresholds for exercising chunking/compression/checkpoint
    /// paths without allocating huge buffers in tests.
    pub fn with_small_thresholds() -> Self {
        Limits {
            compress_threshold_bytes: 64,
            chunk_threshold_bytes: 1024,
            wal_checkpoint_ops: 8,
            wal_checkpoint_interval_secs: 1,
            wal_checkpoint_size_bytes: 16 * 1024,
            wal_warn_size_bytes: 8 * 1024,
            reader_pool_max: 4,
            reader_pool_min: 1,
            memory_guardian_soft_pct: 80,
            memory_guardian_hard_pct: 90,
            max_record_bytes: 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let l = Limits::default();
        assert_eq!(l.compress_threshold_bytes, 1024);
        assert_eq!(l.chunk_threshold_bytes, 4 * 1024 * 1024);
        assert_eq!(l.wal_checkpoint_ops, 1000);
        assert_eq!(l.reader_pool_max, 8);
        assert_eq!(l.reader_pool_min, 2);
    }

    #[test]
    fn small_thresholds_are_smaller_than_defaults() {
        let small = Limits::with_small_thresholds();
        let def = Limits::default();
        assert!(small.chunk_threshold_bytes < def.chunk_threshold_bytes);
        assert!(small.compress_threshold_bytes < def.compress_threshold_bytes);
    }
}

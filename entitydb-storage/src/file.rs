//! `EntityDbFile`: owns the single on-disk `.edb` file and orchestrates
//! its header, WAL, reader pool, and mmap-based read access (spec.md
//! §4.1).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use entitydb_core::{Limits, Result};
use entitydb_format::{FileHeader, Region, WalRecord, HEADER_SIZE};
use memmap2::Mmap;
use parking_lot::Mutex;

use crate::header_sync::HeaderSync;
use crate::reader_pool::ReaderPool;
use crate::recovery::{recover_wal, RecoveryReport};
use crate::wal::WalAppender;

pub struct EntityDbFile {
    path: PathBuf,
    write_handle: Mutex<File>,
    pub header_sync: HeaderSync,
    pub reader_pool: ReaderPool,
    pub limits: Limits,
}

impl EntityDbFile {
    /// Create a brand-new, empty `.edb` file at `path`. Fails if a file
    /// already exists there.
    pub fn create_new(path: impl AsRef<Path>, limits: Limits) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).create_new(true).open(&path)?;
        let header = FileHeader::new_empty();
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;
        let write_handle = file.try_clone()?;

        Ok(EntityDbFile {
            path: path.clone(),
            write_handle: Mutex::new(write_handle),
            header_sync: HeaderSync::new(header),
            reader_pool: ReaderPool::new(path, limits.reader_pool_max, limits.reader_pool_min),
            limits,
        })
    }

    /// Open an existing `.edb` file, replaying its WAL region. Returns
    /// the opened file, the decoded WAL records a caller must replay
    /// into its own working set, and a report for observability.
    pub fn open_existing(path: impl AsRef<Path>, limits: Limits) -> Result<(Self, Vec<WalRecord>, RecoveryReport)> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let actual_size = file.metadata()?.len();

        let mut header_bytes = vec![0u8; HEADER_SIZE];
        file.read_exact_at(&mut header_bytes, 0)?;
        let header = FileHeader::from_bytes(&header_bytes)?;
        header.validate(actual_size)?;

        // Scan out to the actual end of file rather than trusting
        // `header.wal.size`: the header's bookkeeping write can lag one
        // record behind the data it describes (see `append_wal_record`).
        let scan_len = actual_size.saturating_sub(header.wal.offset);
        let mut wal_bytes = vec![0u8; scan_len as usize];
        if !wal_bytes.is_empty() {
            file.read_exact_at(&mut wal_bytes, header.wal.offset)?;
        }
        let (records, report) = recover_wal(&header, &wal_bytes);

        let write_handle = file.try_clone()?;
        let db = EntityDbFile {
            path: path.clone(),
            write_handle: Mutex::new(write_handle),
            header_sync: HeaderSync::new(header),
            reader_pool: ReaderPool::new(path, limits.reader_pool_max, limits.reader_pool_min),
            limits,
        };
        Ok((db, records, report))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw bytes of one header-described region (data section,
    /// tag dictionary, entity index, or deletion index) as it stood at
    /// the last committed checkpoint.
    pub fn read_region(&self, region: Region) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; region.size as usize];
        if !buf.is_empty() {
            self.write_handle.lock().read_exact_at(&mut buf, region.offset)?;
        }
        Ok(buf)
    }

    /// A fresh handle to the same underlying file, for callers (e.g. a
    /// checkpoint routine) that need direct `File` access outside the
    /// append path's internal mutex.
    pub fn try_clone_handle(&self) -> Result<File> {
        Ok(self.write_handle.lock().try_clone()?)
    }

    /// Append one WAL record and fsync before returning. Returns the new
    /// used size of the WAL region.
    ///
    /// The header's `wal.size`/`wal_sequence` bookkeeping is rewritten and
    /// fsynced right after the record itself, so a crash between the two
    /// writes leaves the header pointing at the pre-append WAL size. That
    /// is safe: `open_existing` rescans the WAL region out to the actual
    /// file length rather than trusting `wal.size` alone, so a record that
    /// made it to disk is still replayed even if the header update did not.
    pub fn append_wal_record(&self, record: &entitydb_format::WalRecord) -> Result<u64> {
        let header = self.header_sync.read();
        let guard = self.write_handle.lock();
        let mut appender = WalAppender::new(&guard, header.wal.offset, header.wal.size);
        let used = appender.append(record)?;
        self.header_sync.update(|h| {
            h.wal.size = used;
            h.wal_sequence = record.sequence;
        })?;
        let updated = self.header_sync.read();
        let mut w = guard.try_clone()?;
        use std::io::{Seek, SeekFrom};
        w.seek(SeekFrom::Start(0))?;
        w.write_all(&updated.to_bytes())?;
        w.sync_all()?;
        Ok(used)
    }

    /// Read-only mmap over the whole file as it stands right now. Callers
    /// must not hold this across a checkpoint; acquire a fresh one after
    /// `reader_pool.generation()` changes.
    pub fn mmap(&self) -> Result<Mmap> {
        let handle = self.reader_pool.acquire()?;
        let mmap = unsafe { Mmap::map(handle.file())? };
        self.reader_pool.release(handle);
        Ok(mmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::Limits;
    use tempfile::tempdir;

    #[test]
    fn create_new_then_open_existing_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");
        {
            let _db = EntityDbFile::create_new(&path, Limits::default()).unwrap();
        }
        let (db, records, report) = EntityDbFile::open_existing(&path, Limits::default()).unwrap();
        assert_eq!(report.records_replayed, 0);
        assert!(records.is_empty());
        assert_eq!(db.header_sync.read().entity_count, 0);
    }

    #[test]
    fn create_new_fails_if_file_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");
        let _db = EntityDbFile::create_new(&path, Limits::default()).unwrap();
        assert!(EntityDbFile::create_new(&path, Limits::default()).is_err());
    }

    #[test]
    fn append_wal_record_is_replayed_after_reopen() {
        use entitydb_core::{StoredTag, Timestamp};
        use entitydb_format::{WalPayload, WalRecord};

        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");
        {
            let db = EntityDbFile::create_new(&path, Limits::default()).unwrap();
            let record = WalRecord {
                sequence: 1,
                payload: WalPayload::AddTag {
                    entity_id: "e1".into(),
                    tag: StoredTag { timestamp: Timestamp::from_nanos(1), key: "k".into(), value: "v".into() },
                },
            };
            db.append_wal_record(&record).unwrap();
        }
        let (db, records, report) = EntityDbFile::open_existing(&path, Limits::default()).unwrap();
        assert_eq!(report.records_replayed, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(db.header_sync.read().wal_sequence, 1);
    }
}

//! The fixed 128-byte file header.
//!
//! ```text
//! [Magic: 4B]      [FormatVersion: u32 LE]   [TotalFileSize: u64 LE]
//! [WalOffset: u64] [WalSize: u64]
//! [DataOffset: u64][DataSize: u64]
//! [TagDictOffset: u64][TagDictSize: u64]
//! [EntityIndexOffset: u64][EntityIndexSize: u64]
//! [DeletionIndexOffset: u64][DeletionIndexSize: u64]
//! [EntityCount: u64][LastModifiedUnixSecs: u64]
//! [WalSequence: u64][CheckpointSequence: u64]
//! ```
//!
//! Every field above is accounted for; there are no reserved bytes in
//! format version 3 — a version bump is required to grow the header, the
//! same way a new segment format would be required downstream.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use entitydb_core::{EntityDbError, Result};

/// Magic bytes identifying an EntityDB unified file: "EDB1".
pub const MAGIC: [u8; 4] = *b"EDB1";

/// Current on-disk format version. Version 2 (legacy split WAL/db/idx
/// files) is explicitly unsupported — there is no compatibility shim.
pub const FORMAT_VERSION: u32 = 3;

/// Fixed size of the header region in bytes.
pub const HEADER_SIZE: usize = 128;

/// One `(offset, size)` pair describing a file region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub offset: u64,
    pub size: u64,
}

impl Region {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// The parsed fixed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub format_version: u32,
    pub total_file_size: u64,
    pub wal: Region,
    pub data: Region,
    pub tag_dict: Region,
    pub entity_index: Region,
    pub deletion_index: Region,
    pub entity_count: u64,
    pub last_modified_unix_secs: u64,
    pub wal_sequence: u64,
    pub checkpoint_sequence: u64,
}

impl FileHeader {
    /// A freshly initialized header for a brand-new file. The caller is
    /// responsible for placing each region immediately after the header
    /// and for keeping offsets consistent as regions grow.
    pub fn new_empty() -> Self {
        FileHeader {
            format_version: FORMAT_VERSION,
            total_file_size: HEADER_SIZE as u64,
            wal: Region { offset: HEADER_SIZE as u64, size: 0 },
            data: Region { offset: HEADER_SIZE as u64, size: 0 },
            tag_dict: Region { offset: HEADER_SIZE as u64, size: 0 },
            entity_index: Region { offset: HEADER_SIZE as u64, size: 0 },
            deletion_index: Region { offset: HEADER_SIZE as u64, size: 0 },
            entity_count: 0,
            last_modified_unix_secs: 0,
            wal_sequence: 0,
            checkpoint_sequence: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.write_all(&MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(self.format_version).unwrap();
        buf.write_u64::<LittleEndian>(self.total_file_size).unwrap();
        for region in [
            &self.wal,
            &self.data,
            &self.tag_dict,
            &self.entity_index,
            &self.deletion_index,
        ] {
            buf.write_u64::<LittleEndian>(region.offset).unwrap();
            buf.write_u64::<LittleEndian>(region.size).unwrap();
        }
        buf.write_u64::<LittleEndian>(self.entity_count).unwrap();
        buf.write_u64::<LittleEndian>(self.last_modified_unix_secs).unwrap();
        buf.write_u64::<LittleEndian>(self.wal_sequence).unwrap();
        buf.write_u64::<LittleEndian>(self.checkpoint_sequence).unwrap();
        debug_assert_eq!(buf.len(), HEADER_SIZE);
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Parse a header from raw bytes. Refuses on magic/version mismatch —
    /// there is no fallback parsing path for older formats (spec.md §6).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(EntityDbError::unrecoverable("file shorter than header size"));
        }
        let mut cursor = Cursor::new(bytes);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(EntityDbError::unrecoverable("bad magic number"));
        }
        let format_version = cursor.read_u32::<LittleEndian>()?;
        if format_version != FORMAT_VERSION {
            return Err(EntityDbError::unrecoverable(format!(
                "unsupported format version {} (only {} is supported)",
                format_version, FORMAT_VERSION
            )));
        }
        let total_file_size = cursor.read_u64::<LittleEndian>()?;

        let mut read_region = |c: &mut Cursor<&[u8]>| -> Result<Region> {
            let offset = c.read_u64::<LittleEndian>()?;
            let size = c.read_u64::<LittleEndian>()?;
            Ok(Region { offset, size })
        };
        let wal = read_region(&mut cursor)?;
        let data = read_region(&mut cursor)?;
        let tag_dict = read_region(&mut cursor)?;
        let entity_index = read_region(&mut cursor)?;
        let deletion_index = read_region(&mut cursor)?;

        let entity_count = cursor.read_u64::<LittleEndian>()?;
        let last_modified_unix_secs = cursor.read_u64::<LittleEndian>()?;
        let wal_sequence = cursor.read_u64::<LittleEndian>()?;
        let checkpoint_sequence = cursor.read_u64::<LittleEndian>()?;

        let header = FileHeader {
            format_version,
            total_file_size,
            wal,
            data,
            tag_dict,
            entity_index,
            deletion_index,
            entity_count,
            last_modified_unix_secs,
            wal_sequence,
            checkpoint_sequence,
        };
        Ok(header)
    }

    /// Validate every offset lands inside the file and that regions do
    /// not overlap (spec.md §3 invariants). Called on open and again
    /// after every checkpoint (`HeaderSync::validate_after`).
    pub fn validate(&self, actual_file_size: u64) -> Result<()> {
        if self.total_file_size > actual_file_size {
            return Err(EntityDbError::corrupt_storage(format!(
                "header claims file size {} but file is only {} bytes",
                self.total_file_size, actual_file_size
            )));
        }
        let regions = [
            ("wal", self.wal),
            ("data", self.data),
            ("tag_dict", self.tag_dict),
            ("entity_index", self.entity_index),
            ("deletion_index", self.deletion_index),
        ];
        for (name, region) in regions {
            if region.offset < HEADER_SIZE as u64 {
                return Err(EntityDbError::corrupt_storage(format!(
                    "{} region offset {} overlaps the header",
                    name, region.offset
                )));
            }
            if region.end() > self.total_file_size {
                return Err(EntityDbError::corrupt_storage(format!(
                    "{} region [{}, {}) extends past declared file size {}",
                    name, region.offset, region.end(), self.total_file_size
                )));
            }
        }
        let mut sorted = regions;
        sorted.sort_by_key(|(_, r)| r.offset);
        for pair in sorted.windows(2) {
            let (name_a, a) = pair[0];
            let (name_b, b) = pair[1];
            if a.size > 0 && b.size > 0 && a.end() > b.offset {
                return Err(EntityDbError::corrupt_storage(format!(
                    "region {} overlaps region {}",
                    name_a, name_b
                )));
            }
        }
        Ok(())
    }
}

//! Binary encode/decode for every region of the EntityDB unified file
//! format (spec.md §4.1). Pure codec logic — no file I/O, no locking.

pub mod codec;
pub mod data_record;
pub mod header;
pub mod index_entry;
pub mod tag_dict;
pub mod wal_record;

pub use data_record::{DataRecord, FLAG_CHUNKED, FLAG_COMPRESSED};
pub use header::{FileHeader, Region, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use index_entry::{DeletionIndexEntry, EntityIndexEntry};
pub use wal_record::{WalOpCode, WalPayload, WalRecord, WAL_RECORD_FORMAT_VERSION};

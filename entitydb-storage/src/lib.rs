//! File-level durability: the unified `.edb` file, its header
//! checkpoint protocol, in-file WAL, bounded reader pool, single-writer
//! compression/chunking path, and crash recovery (spec.md §4.1–§4.5,
//! §4.8, §4.9).

pub mod checkpoint;
pub mod file;
pub mod header_sync;
pub mod reader_pool;
pub mod recovery;
pub mod wal;
pub mod writer;

pub use checkpoint::{run_checkpoint, CheckpointInput, CheckpointReport};
pub use file::EntityDbFile;
pub use header_sync::{HeaderState, HeaderSync};
pub use reader_pool::{ReaderHandle, ReaderPool};
pub use recovery::{recover_wal, RecoveryReport};
pub use writer::{decode_record_content, prepare_write, PreparedWrite};

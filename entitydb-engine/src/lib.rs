//! EntityDB: a single-node temporal store for `(id, tags, content)`
//! entities backed by one unified on-disk file (spec.md §1–§5).
//!
//! This crate wires together `entitydb-format` (binary codecs),
//! `entitydb-index` (the sharded tag index), and `entitydb-storage`
//! (WAL, checkpoint, reader pool) behind [`EntityRepository`], the
//! public operation surface: `Create`, `Update`, `AddTag`, `Delete`,
//! `ListByTag`/`ListByTagsAll`, `Query`, and the temporal reads
//! `GetAsOf`/`GetHistory`/`GetDiff`/`GetChangesSince`.

pub mod config;
pub mod memory_guardian;
pub mod query;
pub mod recursion_guard;
pub mod repository;
pub mod temporal;

pub use config::EntityDbConfig;
pub use memory_guardian::{MemoryGuardian, MemoryPressure};
pub use query::QueryFilter;
pub use recursion_guard::RecursionGuard;
pub use repository::{EntityRepository, Stats};
pub use temporal::{content_as_of, diff_tags, ContentVersion, TagDiff};

pub use entitydb_core::{Entity, EntityDbError, EntityId, Lifecycle, Result, StoredTag, Timestamp};
pub use entitydb_storage::RecoveryReport;

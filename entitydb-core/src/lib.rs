//! Shared types for the EntityDB storage core: the entity data model, the
//! unified error type, nanosecond timestamps, and configurable size limits.
//!
//! This crate has no I/O and no locking — it is the vocabulary the rest of
//! the workspace (`entitydb-format`, `entitydb-index`, `entitydb-storage`,
//! `entitydb-engine`) shares.

pub mod entity;
pub mod error;
pub mod limits;
pub mod timestamp;

pub use entity::{split_logical_tag, Entity, EntityId, Lifecycle, StoredTag};
pub use error::{EntityDbError, Result};
pub use limits::Limits;
pub use timestamp::Timestamp;

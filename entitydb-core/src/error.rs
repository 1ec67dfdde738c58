//! The unified error type for EntityDB core operations.
//!
//! Every public API in the workspace returns [`Result<T>`]. Error kinds are
//! behavioral (spec.md §7), not a one-to-one mirror of internal plumbing —
//! callers should match on the kind, not on string contents.

use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, EntityDbError>;

/// Unified error type for EntityDB operations.
#[derive(Debug, Error)]
pub enum EntityDbError {
    /// Entity id or tag absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// `Create` collided with an existing id.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// Malformed tag, oversized content, or invalid id, with the offending
    /// field named for context.
    #[error("corrupt input in field '{field}': {reason}")]
    CorruptInput { field: String, reason: String },

    /// On-disk inconsistency detected. Automatic recovery is attempted
    /// before this is surfaced (spec.md §7).
    #[error("corrupt storage: {0}")]
    CorruptStorage(String),

    /// Reader pool saturated past its acquire timeout, or the memory
    /// guardian refused an allocation.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Caller-supplied deadline was exceeded.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Surfaced unchanged from an external RBAC collaborator.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Header magic/version mismatch at open time, or the recovery
    /// corruption cap was exceeded. The database refuses to open.
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EntityDbError {
    pub fn not_found(what: impl Into<String>) -> Self {
        EntityDbError::NotFound(what.into())
    }

    pub fn duplicate_id(id: impl Into<String>) -> Self {
        EntityDbError::DuplicateId(id.into())
    }

    pub fn corrupt_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EntityDbError::CorruptInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt_storage(reason: impl Into<String>) -> Self {
        EntityDbError::CorruptStorage(reason.into())
    }

    pub fn resource_exhausted(reason: impl Into<String>) -> Self {
        EntityDbError::ResourceExhausted(reason.into())
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        EntityDbError::Timeout(reason.into())
    }

    pub fn unrecoverable(reason: impl Into<String>) -> Self {
        EntityDbError::Unrecoverable(reason.into())
    }

    /// Whether a caller may usefully retry the operation after automatic
    /// recovery (spec.md §7: "CorruptStorage... retries once").
    pub fn is_retryable(&self) -> bool {
        matches!(self, EntityDbError::CorruptStorage(_) | EntityDbError::ResourceExhausted(_))
    }

    /// Whether this indicates the database is unusable without operator
    /// intervention.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, EntityDbError::Unrecoverable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_storage_is_retryable() {
        assert!(EntityDbError::corrupt_storage("bad offset").is_retryable());
    }

    #[test]
    fn not_found_is_not_retryable() {
        assert!(!EntityDbError::not_found("u1").is_retryable());
    }

    #[test]
    fn unrecoverable_flag() {
        let e = EntityDbError::unrecoverable("bad magic");
        assert!(e.is_unrecoverable());
        assert!(!EntityDbError::not_found("x").is_unrecoverable());
    }

    #[test]
    fn display_includes_field_context() {
        let e = EntityDbError::corrupt_input("tags", "missing separator");
        let msg = e.to_string();
        assert!(msg.contains("tags"));
        assert!(msg.contains("missing separator"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: EntityDbError = io_err.into();
        assert!(matches!(e, EntityDbError::Io(_)));
    }
}

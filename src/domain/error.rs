//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::entities::UserId;

/// Domain errors represent structural violations of the partner hierarchy.
/// Construction errors are fatal: a tree that hit one is never published.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("partner not found: {0}")]
    NotFound(UserId),

    #[error("duplicate partner id: {0}")]
    DuplicateId(UserId),

    #[error("partner {user_id} references unknown recruiter {recruiter_id}")]
    OrphanRecruiter { user_id: UserId, recruiter_id: UserId },

    #[error("cycle detected in recruit hierarchy at partner: {0}")]
    CycleDetected(UserId),

    #[error("inconsistent upgrade times for partner {user_id}: {reason}")]
    InvalidUpgradeTime { user_id: UserId, reason: String },

    #[error("invalid date window: {0}")]
    InvalidWindow(String),
}

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, DomainError>;

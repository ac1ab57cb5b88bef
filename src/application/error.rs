//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::{DomainError, UserId};
use crate::infrastructure::LedgerError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// The ledger could not be queried; the caller decides to skip or abort.
    #[error("data source error: {context}")]
    DataSource {
        context: String,
        #[source]
        source: LedgerError,
    },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("rule evaluation failed for partner {user_id}: {message}")]
    Rule { user_id: UserId, message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    pub fn data_source(context: impl Into<String>, source: LedgerError) -> Self {
        Self::DataSource {
            context: context.into(),
            source,
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;

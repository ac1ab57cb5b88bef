//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;
use crate::exitcode;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Usage(String),
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

impl From<DomainError> for CliError {
    fn from(e: DomainError) -> Self {
        ApplicationError::from(e).into()
    }
}

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => exitcode::USAGE,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => exitcode::IOERR,
                InfraError::Parse { .. } => exitcode::DATAERR,
                InfraError::Application(e) => match e {
                    ApplicationError::Domain(DomainError::NotFound(_)) => exitcode::NOINPUT,
                    ApplicationError::Domain(DomainError::InvalidWindow(_)) => exitcode::USAGE,
                    ApplicationError::Domain(_) => exitcode::DATAERR,
                    ApplicationError::DataSource { .. } => exitcode::UNAVAILABLE,
                    ApplicationError::Config { .. } => exitcode::CONFIG,
                    ApplicationError::Rule { .. } | ApplicationError::OperationFailed { .. } => {
                        exitcode::SOFTWARE
                    }
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::LedgerError;

    #[test]
    fn test_exit_codes_follow_error_layer() {
        assert_eq!(CliError::Usage("x".into()).exit_code(), exitcode::USAGE);
        assert_eq!(CliError::from(DomainError::NotFound(7)).exit_code(), exitcode::NOINPUT);
        assert_eq!(CliError::from(DomainError::CycleDetected(7)).exit_code(), exitcode::DATAERR);
        let unavailable = ApplicationError::data_source("gmv", LedgerError::Timeout);
        assert_eq!(CliError::from(unavailable).exit_code(), exitcode::UNAVAILABLE);
    }
}

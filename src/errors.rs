//! All errors that can occur in the shellfish-qmra library.

use std::fmt;

pub type Result<T> = std::result::Result<T, QmraError>;

#[derive(Clone, Debug, PartialEq)]
pub enum QmraError {
    /// Structurally invalid input reached the engine. Raised before any iteration of the affected
    /// site runs and never aborts the other sites of a batch.
    ConfigurationError(String),
    /// An internal computation received a value outside of its domain. Signals a defect or a
    /// misconfigured model parameter, not sampled variability.
    ValidationError(String),
    ReadError(String),
    WriteError(String),
    Cancelled,
}

impl QmraError {
    /// Attach the site and iteration to a validation error raised inside a run.
    pub fn in_iteration(self, site: &str, iteration: usize) -> Self {
        match self {
            QmraError::ValidationError(message) => QmraError::ValidationError(format!(
                "site '{site}', iteration {iteration}: {message}"
            )),
            other => other,
        }
    }
}

impl fmt::Display for QmraError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QmraError::ConfigurationError(message) => {
                write!(f, "ConfigurationError: {}", message)
            }
            QmraError::ValidationError(message) => {
                write!(f, "ValidationError: {}", message)
            }
            QmraError::ReadError(message) => {
                write!(f, "ReadError: {}", message)
            }
            QmraError::WriteError(message) => {
                write!(f, "WriteError: {}", message)
            }
            QmraError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for QmraError {}

//! Domain error types.

use thiserror::Error;

/// Errors that can occur in pure domain operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// A stored value could not be interpreted.
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

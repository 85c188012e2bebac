//! Error types for the core value crate.

use thiserror::Error;

/// Errors raised by core type conversions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A value had the wrong shape for the target type.
    #[error("invalid format: {message}")]
    InvalidFormat { message: String },

    /// A value was well-formed but semantically unacceptable.
    #[error("invalid data: {message}")]
    InvalidData { message: String },
}

impl CoreError {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }
}

/// Result alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

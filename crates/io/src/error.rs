//! Error types for canonical serialization.

use thiserror::Error;

/// Errors raised while encoding or decoding canonical bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    /// Ran off the end of the input while decoding.
    #[error("unexpected end of stream: needed {needed} more bytes while reading {context}")]
    EndOfStream { needed: usize, context: String },

    /// The input decoded but the value is not acceptable.
    #[error("invalid data while reading {context}: {reason}")]
    InvalidData { context: String, reason: String },

    /// A length prefix exceeded the caller-supplied bound.
    #[error("length {length} exceeds limit {limit} while reading {context}")]
    LengthExceeded {
        length: u64,
        limit: u64,
        context: String,
    },

    /// An operation was attempted that the reader cannot perform.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl IoError {
    pub fn end_of_stream(needed: usize, context: impl Into<String>) -> Self {
        Self::EndOfStream {
            needed,
            context: context.into(),
        }
    }

    pub fn invalid_data(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn length_exceeded(length: u64, limit: u64, context: impl Into<String>) -> Self {
        Self::LengthExceeded {
            length,
            limit,
            context: context.into(),
        }
    }
}

/// Result alias used throughout the io crate.
pub type IoResult<T> = std::result::Result<T, IoError>;

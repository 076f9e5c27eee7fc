//! Hashing error types.

use thiserror::Error;

/// Errors that can occur while parsing or computing content hashes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// Input is not valid hexadecimal.
    #[error("Invalid hex: {reason}")]
    InvalidHex {
        /// Reason the input was rejected.
        reason: String,
    },

    /// Decoded hash has the wrong length.
    #[error("Invalid hash length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Input was empty.
    #[error("Empty hash")]
    Empty,
}

impl HashError {
    /// Create an invalid hex error.
    #[must_use]
    pub fn invalid_hex(reason: impl Into<String>) -> Self {
        Self::InvalidHex {
            reason: reason.into(),
        }
    }
}

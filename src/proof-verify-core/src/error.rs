//! Error types for verification operations.
//!
//! These errors are internal plumbing. The four engine operations never
//! return them to callers: every failure is folded into a structured result
//! (degraded verification, partial chain, unknown block, inconclusive
//! verdict).

use thiserror::Error;

/// Errors that can occur while talking to upstream collaborators.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Network-level failure (timeout, refused connection, DNS).
    #[error("Transport error from {endpoint}: {message}")]
    Transport {
        /// Endpoint that failed.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// Upstream answered with a non-success status.
    #[error("HTTP {status} from {endpoint}")]
    UpstreamStatus {
        /// Endpoint that answered.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// Upstream answered successfully but with nothing usable.
    #[error("Empty response from {endpoint}")]
    EmptyResponse {
        /// Endpoint that answered.
        endpoint: String,
    },

    /// Upstream body could not be decoded into the expected shape.
    #[error("Failed to decode response from {endpoint}: {message}")]
    Decode {
        /// Endpoint that answered.
        endpoint: String,
        /// Decoder message.
        message: String,
    },

    /// Every candidate endpoint for an operation failed.
    #[error("All {attempts} candidates exhausted for {operation}")]
    Exhausted {
        /// Logical operation name.
        operation: String,
        /// Number of candidates tried.
        attempts: usize,
    },

    /// The caller's overall deadline elapsed.
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// Operation that was cut short.
        operation: String,
    },

    /// Malformed proof identifier.
    #[error("Invalid proof identifier: {0}")]
    InvalidProofId(#[from] proof_hash::HashError),

    /// Malformed caller input other than the identifier.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}

impl VerifyError {
    /// Whether a cascade should move on to the next candidate.
    ///
    /// Transport failures and unusable responses are recoverable; local
    /// input and configuration problems are not, since every candidate
    /// would fail the same way.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::UpstreamStatus { .. }
                | Self::EmptyResponse { .. }
                | Self::Decode { .. }
                | Self::Exhausted { .. }
        )
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

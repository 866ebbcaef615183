//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// A key string was not 64 hex digits
    #[error("invalid key: expected 64 hex digits")]
    InvalidKey,
}

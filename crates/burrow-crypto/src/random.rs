//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG.

use crate::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the OS source fails.
pub fn random_bytes(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFailed)
}

/// Fill a buffer, blocking until the entropy pool is initialized.
///
/// Reserved for long-term identity key generation. On current kernels
/// `getrandom(2)` already blocks until the pool is seeded, which is the
/// guarantee the historical `/dev/random` read provided.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the OS source fails.
pub fn random_bytes_blocking(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFailed)
}

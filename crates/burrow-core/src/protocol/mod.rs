//! The EC25519-FHMQVC session protocol.
//!
//! Two peers with long-lived ec25519 keys run a three-message handshake
//! combining long-term and ephemeral keys in a fully hashed MQV
//! derivation. Submodules:
//! - [`handshake`]: the message state machine
//! - [`session`]: establishment, rollover and the data paths

pub mod handshake;
pub mod session;

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::RngCore;

use burrow_crypto::ec25519::{scalar_base_mult, PublicKey, SecretKey};
use burrow_crypto::random::random_bytes_blocking;
use burrow_crypto::CryptoError;

use crate::config::ConfigError;

/// Protocol name carried in handshake records; peers must agree.
pub const PROTOCOL_NAME: &str = "ec25519-fhmqvc";

/// How long a handshake key is used for new handshakes.
const HANDSHAKE_KEY_PREFERRED: Duration = Duration::from_secs(15);

/// How long responses to a handshake key are still accepted.
const HANDSHAKE_KEY_VALID: Duration = Duration::from_secs(30);

/// Retry interval for unanswered handshakes.
pub(crate) const HANDSHAKE_RETRY: Duration = Duration::from_secs(20);

/// The long-term identity key pair.
pub struct IdentityKeys {
    /// Secret scalar, sanitized.
    pub secret: SecretKey,
    /// Public key.
    pub public: PublicKey,
}

impl IdentityKeys {
    /// Load the identity from a 64-hex-digit secret.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSecret`] when the string is not a
    /// valid key.
    pub fn from_secret_hex(secret: &str) -> Result<Self, ConfigError> {
        let secret = SecretKey::from_hex(secret)
            .map_err(|_| ConfigError::InvalidSecret)?
            .sanitize();
        let public = scalar_base_mult(&secret).encode();
        Ok(Self { secret, public })
    }

    /// Generate a fresh identity from the blocking CSPRNG source.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the OS source fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; 32];
        random_bytes_blocking(&mut bytes)?;
        let secret = SecretKey::from_bytes(bytes).sanitize();
        let public = scalar_base_mult(&secret).encode();
        Ok(Self { secret, public })
    }
}

/// An ephemeral handshake key with its usage deadlines.
///
/// Invariant: `preferred_till <= valid_till`.
#[derive(Clone)]
pub struct HandshakeKey {
    pub(crate) secret: SecretKey,
    pub(crate) public: PublicKey,
    preferred_till: Instant,
    valid_till: Instant,
}

impl HandshakeKey {
    fn generate(now: Instant, rng: &mut StdRng) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let secret = SecretKey::from_bytes(bytes).sanitize();
        let public = scalar_base_mult(&secret).encode();
        Self {
            secret,
            public,
            preferred_till: now + HANDSHAKE_KEY_PREFERRED,
            valid_till: now + HANDSHAKE_KEY_VALID,
        }
    }

    fn is_preferred(&self, now: Instant) -> bool {
        now < self.preferred_till
    }

    fn is_valid(&self, now: Instant) -> bool {
        now < self.valid_till
    }
}

/// The process-wide pool of handshake keys: the current one and its
/// immediate predecessor, so in-flight responses to a just-rotated key
/// still resolve.
pub struct HandshakePool {
    current: HandshakeKey,
    previous: Option<HandshakeKey>,
}

impl HandshakePool {
    /// Pool with a freshly generated current key.
    pub(crate) fn new(now: Instant, rng: &mut StdRng) -> Self {
        Self {
            current: HandshakeKey::generate(now, rng),
            previous: None,
        }
    }

    /// Lazy maintenance, run on every handshake path: once the current key
    /// is no longer preferred it moves to the previous slot (zeroizing the
    /// evicted key on drop) and a fresh key takes its place.
    pub(crate) fn maintain(&mut self, now: Instant, rng: &mut StdRng) {
        if !self.current.is_preferred(now) {
            tracing::debug!("generating new handshake key");
            let fresh = HandshakeKey::generate(now, rng);
            self.previous = Some(std::mem::replace(&mut self.current, fresh));
        }
    }

    /// The key used for new handshakes.
    pub(crate) fn current(&self) -> &HandshakeKey {
        &self.current
    }

    /// Find a still-valid pool key by its public half, current first.
    pub(crate) fn find_valid(&self, now: Instant, public: &PublicKey) -> Option<&HandshakeKey> {
        if self.current.is_valid(now) && self.current.public == *public {
            return Some(&self.current);
        }
        self.previous
            .as_ref()
            .filter(|key| key.is_valid(now) && key.public == *public)
    }

    /// Whether the public half belongs to either pool slot, valid or not.
    pub(crate) fn contains(&self, public: &PublicKey) -> bool {
        self.current.public == *public
            || self.previous.as_ref().is_some_and(|key| key.public == *public)
    }
}

/// Progress of one handshake exchange, gated on tag verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeProgress {
    /// We sent an init and await the response.
    Initiated,
    /// We answered an init and await the finish.
    Responded,
}

//! SHA-256 and HMAC-SHA-256.
//!
//! The handshake hashes concatenations of public keys (`X‖Y‖A‖B‖σ`); the
//! multi-part interface feeds the parts straight into the digest without an
//! intermediate buffer.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{HASH_SIZE, HMAC_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 over the concatenation of `parts`.
#[must_use]
pub fn sha256(parts: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// HMAC-SHA-256 over the concatenation of `parts`.
///
/// # Panics
///
/// Never panics: HMAC-SHA-256 accepts keys of any length.
#[must_use]
pub fn hmac_sha256(key: &[u8; HASH_SIZE], parts: &[&[u8]]) -> [u8; HMAC_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Constant-time verification of an HMAC-SHA-256 tag.
#[must_use]
pub fn hmac_sha256_verify(tag: &[u8], key: &[u8; HASH_SIZE], parts: &[&[u8]]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(tag).is_ok()
}

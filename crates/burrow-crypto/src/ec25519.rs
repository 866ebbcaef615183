//! ec25519 group arithmetic (Edwards form of curve25519).
//!
//! The FHMQV-C handshake combines long-term and ephemeral keys with point
//! addition (`σ = s·(d·A + X)`), so this façade exposes the full Edwards
//! group instead of the x-only Montgomery ladder:
//! - Secret scalars with RFC 7748 clamping
//! - Compressed 32-byte public key encoding
//! - Scalar multiplication, base multiplication, point addition
//! - Identity test for rejecting degenerate exchange results
//! - Scalar arithmetic modulo the group order for the hashed exponents

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar as RawScalar;
use curve25519_dalek::traits::IsIdentity;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// ec25519 secret key (32-byte scalar).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

/// ec25519 public key (compressed Edwards point, 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

/// A point on the curve in working (decompressed) form.
#[derive(Clone, Copy)]
pub struct Point(EdwardsPoint);

/// A scalar modulo the group order.
///
/// Used for the hash-derived FHMQV exponents and the combined secret
/// exponent `s`; zeroed on drop since `s` is key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Scalar(RawScalar);

impl SecretKey {
    /// Import a secret scalar from raw bytes.
    ///
    /// The bytes are used as-is; call [`SecretKey::sanitize`] before using
    /// the result as a Diffie-Hellman exponent.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a secret key from 64 hex digits (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the string is not exactly
    /// 64 hex digits.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let mut bytes = [0u8; 32];
        if s.len() != 64 {
            return Err(CryptoError::InvalidKey);
        }
        hex::decode_to_slice(s, &mut bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Clamp the scalar per RFC 7748.
    ///
    /// Idempotent: sanitizing a sanitized key is a no-op.
    #[must_use]
    pub fn sanitize(mut self) -> Self {
        self.0[0] &= 0xf8;
        self.0[31] &= 0x7f;
        self.0[31] |= 0x40;
        self
    }

    /// Raw bytes of the scalar.
    ///
    /// # Security
    ///
    /// Handle with care; this is long-term or ephemeral key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding of the scalar, for key display.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl PublicKey {
    /// Import a public key from its 32-byte compressed encoding.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a public key from 64 hex digits (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the string is not exactly
    /// 64 hex digits.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let mut bytes = [0u8; 32];
        if s.len() != 64 {
            return Err(CryptoError::InvalidKey);
        }
        hex::decode_to_slice(s, &mut bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Decompress into working form.
    ///
    /// Returns `None` if the bytes are not a valid point encoding; callers
    /// treat that exactly like a degenerate exchange result (silent drop).
    #[must_use]
    pub fn decode(&self) -> Option<Point> {
        CompressedEdwardsY(self.0).decompress().map(Point)
    }

    /// Raw compressed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding, for key display and logs.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl Point {
    /// Compress to the 32-byte wire encoding.
    #[must_use]
    pub fn encode(&self) -> PublicKey {
        PublicKey(self.0.compress().to_bytes())
    }

    /// Test for the group identity.
    ///
    /// The combined FHMQV point is rejected when it lands on the identity;
    /// this guards small-subgroup and degenerate inputs.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.0.is_identity()
    }

    /// Point addition.
    #[must_use]
    pub fn add(&self, other: &Point) -> Point {
        Point(self.0 + other.0)
    }

    /// Scalar multiplication `n·P`.
    #[must_use]
    pub fn mul(&self, n: &Scalar) -> Point {
        Point(self.0 * n.0)
    }
}

impl Scalar {
    /// Reduce a secret key modulo the group order.
    ///
    /// Clamped scalars exceed the order; reduction yields the same point
    /// under multiplication.
    #[must_use]
    pub fn from_secret(key: &SecretKey) -> Self {
        Self(RawScalar::from_bytes_mod_order(*key.as_bytes()))
    }

    /// Build an FHMQV exponent from one half of the exchange hash.
    ///
    /// The 16-byte half is taken little-endian with the top bit forced
    /// (`half[15] |= 0x80`), guaranteeing a full-length nonzero exponent.
    #[must_use]
    pub fn from_half_hash(half: &[u8; 16]) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(half);
        bytes[15] |= 0x80;
        Self(RawScalar::from_bytes_mod_order(bytes))
    }

    /// `self·b + c` modulo the group order.
    #[must_use]
    pub fn mul_add(&self, b: &Scalar, c: &Scalar) -> Scalar {
        Scalar(self.0 * b.0 + c.0)
    }
}

/// `n·G` for the curve base point.
#[must_use]
pub fn scalar_base_mult(key: &SecretKey) -> Point {
    Point(EdwardsPoint::mul_base(
        &RawScalar::from_bytes_mod_order(*key.as_bytes()),
    ))
}

/// `n·P` for an arbitrary point.
#[must_use]
pub fn scalar_mult(n: &Scalar, p: &Point) -> Point {
    p.mul(n)
}

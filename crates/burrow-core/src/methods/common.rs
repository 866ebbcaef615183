//! Record-layer state shared by all methods.
//!
//! Each method session embeds a [`CommonState`]: the 6-byte little-endian
//! nonce counters, the reorder window, and the validity/refresh deadlines.
//!
//! Nonces carry a parity convention so the two directions of a shared key
//! never collide: the initiator sends odd nonces starting at 3, the
//! responder even nonces starting at 2. A receiver accepts only nonces of
//! the opposite side's parity.

use std::time::{Duration, Instant};

use rand::Rng;

use super::{MethodEnv, MethodError};

/// Wire size of a record nonce.
pub const NONCE_SIZE: usize = 6;

/// A 6-byte little-endian nonce.
pub type Nonce = [u8; NONCE_SIZE];

/// Nonce values are 48-bit; a send counter reaching this ceiling exhausts
/// the session.
const NONCE_CEILING: u64 = 1 << 48;

/// Depth of the reorder seen-bitmap.
const REORDER_BITMAP_BITS: i64 = 64;

fn nonce_to_u64(nonce: &Nonce) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..NONCE_SIZE].copy_from_slice(nonce);
    u64::from_le_bytes(bytes)
}

fn u64_to_nonce(value: u64) -> Nonce {
    let bytes = value.to_le_bytes();
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
    nonce
}

/// Record-layer state embedded in every method session.
#[derive(Debug)]
pub struct CommonState {
    initiator: bool,
    send_nonce: Nonce,
    receive_nonce: Nonce,
    receive_reorder_seen: u64,
    receive_last: Instant,
    valid_till: Instant,
    refresh_after: Instant,
    reorder_time: Duration,
    reorder_count: u16,
    nonce_exhausted: bool,
}

impl CommonState {
    /// Fresh state at session birth.
    ///
    /// The low bit of the send nonce is fixed here and never changes:
    /// initiator 3 (odd), responder 2 (even). The receive counter starts at
    /// the opposite parity so the first inbound packet is always "newer".
    pub fn new(env: &mut MethodEnv<'_>, initiator: bool) -> Self {
        let splay_secs = env.timing.key_refresh_splay.as_secs();
        let splay = Duration::from_secs(env.rng.gen_range(0..=splay_secs));

        let (send_start, receive_start) = if initiator { (3, 0) } else { (2, 1) };

        Self {
            initiator,
            send_nonce: u64_to_nonce(send_start),
            receive_nonce: u64_to_nonce(receive_start),
            receive_reorder_seen: 0,
            receive_last: env.now,
            valid_till: env.now + env.timing.key_valid,
            refresh_after: env.now + env.timing.key_refresh.saturating_sub(splay),
            reorder_time: env.timing.reorder_time,
            reorder_count: env.timing.reorder_count,
            nonce_exhausted: false,
        }
    }

    /// Whether the local side initiated this session.
    #[must_use]
    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    /// Valid while unexpired and the send nonce has not hit the 48-bit
    /// ceiling.
    #[must_use]
    pub fn is_valid(&self, now: Instant) -> bool {
        !self.nonce_exhausted && now < self.valid_till
    }

    /// True once the refresh point has passed. Only the initiator drives
    /// rekeys, so the responder never reports refresh.
    #[must_use]
    pub fn want_refresh(&self, now: Instant) -> bool {
        self.initiator && now >= self.refresh_after
    }

    /// Take the next send nonce, advancing the counter by 2.
    ///
    /// # Errors
    ///
    /// Returns [`MethodError::SessionInvalid`] once the counter would pass
    /// the 48-bit ceiling; the session must then be considered dead.
    pub fn next_send_nonce(&mut self) -> Result<Nonce, MethodError> {
        if self.nonce_exhausted {
            return Err(MethodError::SessionInvalid);
        }
        let nonce = self.send_nonce;
        let next = nonce_to_u64(&nonce) + 2;
        if next >= NONCE_CEILING {
            self.nonce_exhausted = true;
        } else {
            self.send_nonce = u64_to_nonce(next);
        }
        Ok(nonce)
    }

    /// Validate an inbound nonce against parity and the receive window,
    /// returning its age in positions (negative = newer than the newest
    /// accepted).
    ///
    /// # Errors
    ///
    /// Returns [`MethodError::BadNonce`] on parity mismatch, when an
    /// out-of-order packet lags more than `reorder_count` positions, or
    /// when the window has gone stale (`reorder_time` since the last
    /// accepted packet).
    pub fn check_receive_nonce(&self, now: Instant, nonce: &Nonce) -> Result<i64, MethodError> {
        if (nonce[0] & 1) != (self.receive_nonce[0] & 1) {
            return Err(MethodError::BadNonce);
        }

        // little-endian subtraction; parity match makes the difference even
        let age = (nonce_to_u64(&self.receive_nonce) as i64 - nonce_to_u64(nonce) as i64) / 2;

        if age >= 0 {
            if now.duration_since(self.receive_last) > self.reorder_time {
                return Err(MethodError::BadNonce);
            }
            if age > i64::from(self.reorder_count) || age > REORDER_BITMAP_BITS {
                return Err(MethodError::BadNonce);
            }
        }

        Ok(age)
    }

    /// Record an authenticated nonce, updating the reorder window.
    ///
    /// Call only after the packet verified; duplicates reported here must
    /// not change any state.
    ///
    /// # Errors
    ///
    /// Returns [`MethodError::Duplicate`] if the nonce was already
    /// accepted.
    pub fn note_receive(&mut self, now: Instant, nonce: &Nonce, age: i64) -> Result<(), MethodError> {
        if age < 0 {
            // newer than anything seen: the bitmap slides toward older
            // positions and the previous newest lands at bit |age|-1
            let shift = -age;
            if shift >= REORDER_BITMAP_BITS {
                self.receive_reorder_seen = 0;
            } else {
                self.receive_reorder_seen <<= shift;
            }
            if shift <= REORDER_BITMAP_BITS {
                self.receive_reorder_seen |= 1u64 << (shift - 1);
            }
            self.receive_nonce = *nonce;
            self.receive_last = now;
            Ok(())
        } else if age == 0 || self.receive_reorder_seen & (1u64 << (age - 1)) != 0 {
            Err(MethodError::Duplicate)
        } else {
            self.receive_reorder_seen |= 1u64 << (age - 1);
            Ok(())
        }
    }
}

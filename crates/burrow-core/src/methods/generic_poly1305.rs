//! Generic stream-cipher + Poly1305 construction.
//!
//! The session secret keys the stream cipher directly; both directions
//! share the key and rely on nonce parity to never collide. Per packet,
//! keystream block 0 supplies the 32-byte one-time Poly1305 key and the
//! payload is encrypted from block 1 on, the same layout NaCl secretbox
//! uses. Wire format: `[nonce:6][tag:16][ciphertext]`.

use std::marker::PhantomData;
use std::time::Instant;

use cipher::consts::{U8, U32};
use cipher::{IvSizeUser, KeyIvInit, KeySizeUser, StreamCipher, StreamCipherSeek};
use poly1305::Poly1305;
use salsa20::{Salsa12, Salsa20};
use subtle::ConstantTimeEq;
use universal_hash::KeyInit;
use zeroize::Zeroize;

use super::common::{CommonState, Nonce, NONCE_SIZE};
use super::{Method, MethodEnv, MethodError, MethodInfo, MethodSession};
use crate::buffer::Buffer;
use crate::packet::PACKET_OVERHEAD;

/// Poly1305 tag size.
const TAG_SIZE: usize = 16;

/// Method header: nonce plus tag.
const HEADER_SIZE: usize = NONCE_SIZE + TAG_SIZE;

static SALSA2012_INFO: MethodInfo = MethodInfo {
    name: "salsa2012+poly1305",
};

static SALSA20_INFO: MethodInfo = MethodInfo {
    name: "salsa20+poly1305",
};

/// Build the portable Salsa20/12 + Poly1305 method.
pub(crate) fn build_salsa2012() -> Box<dyn Method> {
    Box::new(GenericPoly1305::<Salsa12>::new(&SALSA2012_INFO))
}

/// Build the portable Salsa20 + Poly1305 method.
pub(crate) fn build_salsa20() -> Box<dyn Method> {
    Box::new(GenericPoly1305::<Salsa20>::new(&SALSA20_INFO))
}

struct GenericPoly1305<C> {
    info: &'static MethodInfo,
    _cipher: PhantomData<C>,
}

impl<C> GenericPoly1305<C> {
    fn new(info: &'static MethodInfo) -> Self {
        Self {
            info,
            _cipher: PhantomData,
        }
    }
}

impl<C> Method for GenericPoly1305<C>
where
    C: KeyIvInit + StreamCipher + StreamCipherSeek,
    C: KeySizeUser<KeySize = U32> + IvSizeUser<IvSize = U8>,
    C: 'static,
{
    fn info(&self) -> &MethodInfo {
        self.info
    }

    fn min_encrypt_head_space(&self) -> usize {
        HEADER_SIZE + PACKET_OVERHEAD
    }

    fn session_init(
        &self,
        env: &mut MethodEnv<'_>,
        secret: &[u8; 32],
        initiator: bool,
    ) -> Box<dyn MethodSession> {
        Box::new(Session::<C> {
            key: *secret,
            common: CommonState::new(env, initiator),
            _cipher: PhantomData,
        })
    }
}

struct Session<C> {
    key: [u8; 32],
    common: CommonState,
    _cipher: PhantomData<C>,
}

impl<C> Drop for Session<C> {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl<C> Session<C>
where
    C: KeyIvInit + StreamCipher + StreamCipherSeek,
    C: KeySizeUser<KeySize = U32> + IvSizeUser<IvSize = U8>,
{
    /// Cipher positioned at block 1 plus the one-time MAC key from block 0.
    fn keystream(&self, nonce: &Nonce) -> (C, [u8; 32]) {
        let mut iv = [0u8; 8];
        iv[..NONCE_SIZE].copy_from_slice(nonce);

        let key: cipher::Key<C> = self.key.into();
        let iv: cipher::Iv<C> = iv.into();
        let mut cipher = C::new(&key, &iv);

        let mut mac_key = [0u8; 32];
        cipher.apply_keystream(&mut mac_key);
        cipher.seek(64u64);
        (cipher, mac_key)
    }
}

impl<C> MethodSession for Session<C>
where
    C: KeyIvInit + StreamCipher + StreamCipherSeek,
    C: KeySizeUser<KeySize = U32> + IvSizeUser<IvSize = U8>,
    C: 'static,
{
    fn is_valid(&self, now: Instant) -> bool {
        self.common.is_valid(now)
    }

    fn is_initiator(&self) -> bool {
        self.common.is_initiator()
    }

    fn want_refresh(&self, now: Instant) -> bool {
        self.common.want_refresh(now)
    }

    fn encrypt(&mut self, mut buffer: Buffer) -> Result<Buffer, MethodError> {
        let nonce = self.common.next_send_nonce()?;
        let (mut cipher, mut mac_key) = self.keystream(&nonce);

        cipher.apply_keystream(buffer.as_mut_slice());
        let tag = Poly1305::new(&mac_key.into()).compute_unpadded(buffer.as_slice());
        mac_key.zeroize();

        buffer.push_head(HEADER_SIZE);
        let head = buffer.as_mut_slice();
        head[..NONCE_SIZE].copy_from_slice(&nonce);
        head[NONCE_SIZE..HEADER_SIZE].copy_from_slice(tag.as_slice());
        Ok(buffer)
    }

    fn decrypt(&mut self, now: Instant, packet: &[u8]) -> Result<Buffer, MethodError> {
        if packet.len() < HEADER_SIZE {
            return Err(MethodError::TooShort);
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&packet[..NONCE_SIZE]);
        let age = self.common.check_receive_nonce(now, &nonce)?;

        let ciphertext = &packet[HEADER_SIZE..];
        let (mut cipher, mut mac_key) = self.keystream(&nonce);
        let expected = Poly1305::new(&mac_key.into()).compute_unpadded(ciphertext);
        mac_key.zeroize();

        if !bool::from(
            expected
                .as_slice()
                .ct_eq(&packet[NONCE_SIZE..HEADER_SIZE]),
        ) {
            return Err(MethodError::VerifyFailed);
        }

        let mut plain = Buffer::from_slice(ciphertext, 0);
        cipher.apply_keystream(plain.as_mut_slice());
        self.common.note_receive(now, &nonce, age)?;
        Ok(plain)
    }
}

#[cfg(test)]
mod tests {
    use super::super::common::tests::test_timing;
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn session_pair(
        build: fn() -> Box<dyn Method>,
    ) -> (Box<dyn MethodSession>, Box<dyn MethodSession>, Instant) {
        let now = Instant::now();
        let timing = test_timing();
        let mut rng = StdRng::seed_from_u64(42);
        let mut env = MethodEnv {
            now,
            timing: &timing,
            rng: &mut rng,
        };
        let method = build();
        let secret = [0x5c; 32];
        let a = method.session_init(&mut env, &secret, true);
        let b = method.session_init(&mut env, &secret, false);
        (a, b, now)
    }

    #[test]
    fn roundtrip_both_directions() {
        for build in [build_salsa2012, build_salsa20] {
            let (mut a, mut b, now) = session_pair(build);

            let packet = a.encrypt(Buffer::from_slice(b"hello", 32)).unwrap();
            assert_eq!(packet.len(), HEADER_SIZE + 5);
            let plain = b.decrypt(now, packet.as_slice()).unwrap();
            assert_eq!(plain.as_slice(), b"hello");

            let packet = b.encrypt(Buffer::from_slice(b"world", 32)).unwrap();
            let plain = a.decrypt(now, packet.as_slice()).unwrap();
            assert_eq!(plain.as_slice(), b"world");
        }
    }

    #[test]
    fn zero_length_keepalive() {
        let (mut a, mut b, now) = session_pair(build_salsa2012);
        let packet = a.encrypt(Buffer::alloc(0, 32)).unwrap();
        assert_eq!(packet.len(), HEADER_SIZE);
        let plain = b.decrypt(now, packet.as_slice()).unwrap();
        assert!(plain.is_empty());
    }

    #[test]
    fn tampering_is_rejected() {
        let (mut a, mut b, now) = session_pair(build_salsa2012);
        let packet = a.encrypt(Buffer::from_slice(b"payload", 32)).unwrap();

        for i in 0..packet.len() {
            let mut mangled = packet.as_slice().to_vec();
            mangled[i] ^= 0x01;
            assert!(
                b.decrypt(now, &mangled).is_err(),
                "bit flip at byte {i} accepted"
            );
        }
        // the pristine packet still decrypts (no state was burned)
        assert!(b.decrypt(now, packet.as_slice()).is_ok());
    }

    #[test]
    fn replay_is_rejected_after_success() {
        let (mut a, mut b, now) = session_pair(build_salsa2012);
        let packet = a.encrypt(Buffer::from_slice(b"once", 32)).unwrap();
        assert!(b.decrypt(now, packet.as_slice()).is_ok());
        assert_eq!(
            b.decrypt(now, packet.as_slice()).unwrap_err(),
            MethodError::Duplicate
        );
    }

    #[test]
    fn wrong_direction_fails() {
        // a initiator packet must not decrypt on the initiator side:
        // parity keeps the directions apart even with a shared key
        let (mut a, _b, now) = session_pair(build_salsa2012);
        let packet = a.encrypt(Buffer::from_slice(b"self", 32)).unwrap();
        assert_eq!(
            a.decrypt(now, packet.as_slice()).unwrap_err(),
            MethodError::BadNonce
        );
    }

    #[test]
    fn short_packet_fails() {
        let (_a, mut b, now) = session_pair(build_salsa2012);
        assert_eq!(
            b.decrypt(now, &[0u8; HEADER_SIZE - 1]).unwrap_err(),
            MethodError::TooShort
        );
    }

    #[test]
    fn send_nonces_differ_per_packet() {
        let (mut a, mut b, now) = session_pair(build_salsa2012);
        let p1 = a.encrypt(Buffer::from_slice(b"one", 32)).unwrap();
        let p2 = a.encrypt(Buffer::from_slice(b"two", 32)).unwrap();
        assert_ne!(p1.as_slice()[..NONCE_SIZE], p2.as_slice()[..NONCE_SIZE]);
        assert!(b.decrypt(now, p1.as_slice()).is_ok());
        assert!(b.decrypt(now, p2.as_slice()).is_ok());
    }
}

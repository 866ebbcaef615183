//! Generic stream-cipher + GMAC construction.
//!
//! The GHASH authentication key is derived once per session from the
//! keystream under the all-zero nonce (record nonces start at 2 and 3, so
//! the zero nonce never appears on the wire). Per packet, the tag is
//! `GHASH(ciphertext ‖ lengths) ⊕ keystream block 0`, the GCM layout, and
//! the payload is encrypted from block 1 on.
//! Wire format: `[nonce:6][tag:16][ciphertext]`.

use std::marker::PhantomData;
use std::time::Instant;

use cipher::consts::{U8, U32};
use cipher::{IvSizeUser, KeyIvInit, KeySizeUser, StreamCipher, StreamCipherSeek};
use ghash::GHash;
use salsa20::{Salsa12, Salsa20};
use subtle::ConstantTimeEq;
use universal_hash::{KeyInit, UniversalHash};
use zeroize::Zeroize;

use super::common::{CommonState, Nonce, NONCE_SIZE};
use super::{Method, MethodEnv, MethodError, MethodInfo, MethodSession};
use crate::buffer::Buffer;
use crate::packet::PACKET_OVERHEAD;

/// GMAC tag size.
const TAG_SIZE: usize = 16;

/// Method header: nonce plus tag.
const HEADER_SIZE: usize = NONCE_SIZE + TAG_SIZE;

static SALSA2012_INFO: MethodInfo = MethodInfo {
    name: "salsa2012+gmac",
};

static SALSA20_INFO: MethodInfo = MethodInfo {
    name: "salsa20+gmac",
};

/// Build the portable Salsa20/12 + GMAC method.
pub(crate) fn build_salsa2012() -> Box<dyn Method> {
    Box::new(GenericGmac::<Salsa12>::new(&SALSA2012_INFO))
}

/// Build the portable Salsa20 + GMAC method.
pub(crate) fn build_salsa20() -> Box<dyn Method> {
    Box::new(GenericGmac::<Salsa20>::new(&SALSA20_INFO))
}

struct GenericGmac<C> {
    info: &'static MethodInfo,
    _cipher: PhantomData<C>,
}

impl<C> GenericGmac<C> {
    fn new(info: &'static MethodInfo) -> Self {
        Self {
            info,
            _cipher: PhantomData,
        }
    }
}

impl<C> Method for GenericGmac<C>
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
        // keystream under the all-zero nonce keys GHASH for the session
        let mut hash_key = [0u8; TAG_SIZE];
        let mut cipher = make_cipher::<C>(secret, &[0u8; NONCE_SIZE]);
        cipher.apply_keystream(&mut hash_key);
        let ghash = GHash::new(&hash_key.into());
        hash_key.zeroize();

        Box::new(Session::<C> {
            key: *secret,
            ghash,
            common: CommonState::new(env, initiator),
            _cipher: PhantomData,
        })
    }
}

fn make_cipher<C>(key: &[u8; 32], nonce: &Nonce) -> C
where
    C: KeyIvInit,
    C: KeySizeUser<KeySize = U32> + IvSizeUser<IvSize = U8>,
{
    let mut iv = [0u8; 8];
    iv[..NONCE_SIZE].copy_from_slice(nonce);
    let key: cipher::Key<C> = (*key).into();
    let iv: cipher::Iv<C> = iv.into();
    C::new(&key, &iv)
}

struct Session<C> {
    key: [u8; 32],
    ghash: GHash,
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
    /// Cipher positioned at block 1 plus the tag mask from block 0.
    fn keystream(&self, nonce: &Nonce) -> (C, [u8; TAG_SIZE]) {
        let mut cipher = make_cipher::<C>(&self.key, nonce);
        let mut mask = [0u8; TAG_SIZE];
        cipher.apply_keystream(&mut mask);
        cipher.seek(64u64);
        (cipher, mask)
    }

    /// `GHASH(ciphertext ‖ lengths) ⊕ mask`.
    fn tag(&self, ciphertext: &[u8], mask: &[u8; TAG_SIZE]) -> [u8; TAG_SIZE] {
        let mut ghash = self.ghash.clone();
        ghash.update_padded(ciphertext);

        let mut length_block = [0u8; TAG_SIZE];
        length_block[8..].copy_from_slice(&(ciphertext.len() as u64 * 8).to_be_bytes());
        ghash.update(&[length_block.into()]);

        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(ghash.finalize().as_slice());
        for (t, m) in tag.iter_mut().zip(mask) {
            *t ^= m;
        }
        tag
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
        let (mut cipher, mask) = self.keystream(&nonce);

        cipher.apply_keystream(buffer.as_mut_slice());
        let tag = self.tag(buffer.as_slice(), &mask);

        buffer.push_head(HEADER_SIZE);
        let head = buffer.as_mut_slice();
        head[..NONCE_SIZE].copy_from_slice(&nonce);
        head[NONCE_SIZE..HEADER_SIZE].copy_from_slice(&tag);
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
        let (mut cipher, mask) = self.keystream(&nonce);
        let expected = self.tag(ciphertext, &mask);

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

//! The three-message FHMQV handshake.
//!
//! ```text
//! Type 1 (init):    A → B   A, [B], X
//! Type 2 (respond): B → A   B, A, Y, X, T₂ = HMAC_K(B ‖ Y)
//! Type 3 (finish):  A → B   A, B, X, Y, T₃ = HMAC_K(A ‖ X)
//! ```
//!
//! Both sides derive `h = SHA256(X‖Y‖A‖B)`, split it into the exponents
//! `d` and `e`, and combine long-term and ephemeral secrets into
//! `σ = (d·a+x)·(e·b+y)·G`; the session secret is `SHA256(X‖Y‖A‖B‖σ)`.
//! Every failure along the way — missing record, unknown sender, wrong
//! recipient, degenerate point, bad tag — drops the message without a
//! reply, denying an oracle to whoever sent it.

use std::net::SocketAddr;

use tracing::{debug, warn};
use zeroize::Zeroizing;

use burrow_crypto::ec25519::{scalar_mult, PublicKey, Scalar, SecretKey};
use burrow_crypto::hash::{hmac_sha256, hmac_sha256_verify, sha256};
use burrow_crypto::{HMAC_SIZE, PUBLIC_KEY_SIZE};

use super::session::establish;
use super::{HandshakeKey, HandshakeProgress, PROTOCOL_NAME};
use crate::context::{Context, Platform};
use crate::framing::{Handshake, HandshakeBuilder, RecordType};
use crate::task::PeerId;

/// All four public values of one exchange in canonical order: initiator
/// ephemeral, responder ephemeral, initiator long-term, responder
/// long-term.
struct ExchangeKeys {
    x: PublicKey,
    y: PublicKey,
    a: PublicKey,
    b: PublicKey,
}

/// Run the FHMQV derivation for one side.
///
/// Returns the 32-byte session secret `SHA256(X‖Y‖A‖B‖σ)`, or `None` when
/// a peer key fails to decode or σ degenerates to the identity — both are
/// silent drops.
fn compute_shared(
    keys: &ExchangeKeys,
    long_secret: &SecretKey,
    eph_secret: &SecretKey,
    initiator: bool,
) -> Option<Zeroizing<[u8; 32]>> {
    let h = sha256(&[
        keys.x.as_bytes(),
        keys.y.as_bytes(),
        keys.a.as_bytes(),
        keys.b.as_bytes(),
    ]);

    let mut half = [0u8; 16];
    half.copy_from_slice(&h[..16]);
    let d = Scalar::from_half_hash(&half);
    half.copy_from_slice(&h[16..]);
    let e = Scalar::from_half_hash(&half);

    // σ = s·(peer hashed-combination); s mixes our long-term and ephemeral
    // secrets with our own hash exponent
    let (own_exponent, peer_exponent, peer_long, peer_eph) = if initiator {
        (&d, &e, keys.b, keys.y)
    } else {
        (&e, &d, keys.a, keys.x)
    };

    let s = own_exponent.mul_add(&Scalar::from_secret(long_secret), &Scalar::from_secret(eph_secret));
    let combined = peer_long.decode()?.mul(peer_exponent).add(&peer_eph.decode()?);
    let sigma = scalar_mult(&s, &combined);
    if sigma.is_identity() {
        return None;
    }

    Some(Zeroizing::new(sha256(&[
        keys.x.as_bytes(),
        keys.y.as_bytes(),
        keys.a.as_bytes(),
        keys.b.as_bytes(),
        sigma.encode().as_bytes(),
    ])))
}

/// Send a Type 1 init to a peer, starting (or retrying) a handshake.
pub(crate) fn start<P: Platform>(ctx: &mut Context<P>, peer: PeerId) {
    ctx.pool.maintain(ctx.now, &mut ctx.rng);

    let Some(addr) = ctx.peers[peer].address else {
        if ctx.peers[peer].is_dynamic() {
            ctx.platform.resolve_peer(peer);
        }
        return;
    };

    debug!(peer = ctx.peers[peer].name(), %addr, "sending handshake");

    let local_key = ctx.pool.current().public;
    let mut builder = HandshakeBuilder::new(1);
    builder.add(RecordType::SenderKey, ctx.identity.public.as_bytes());
    builder.add(RecordType::RecipientKey, ctx.peers[peer].key.as_bytes());
    builder.add(RecordType::SenderHandshakeKey, local_key.as_bytes());
    builder.add(RecordType::Mode, &[ctx.config.mode.as_byte()]);
    builder.add(RecordType::ProtocolName, PROTOCOL_NAME.as_bytes());
    ctx.platform.send_packet(addr, builder.finish());

    let pool = &ctx.pool;
    ctx.peers[peer].upsert_handshake(pool, local_key, HandshakeProgress::Initiated);
}

/// Match an inbound sender key to a configured peer.
///
/// Static associations win; otherwise floating peers match from anywhere
/// and dynamic peers trigger resolution and defer the handshake.
fn match_sender_key<P: Platform>(
    ctx: &mut Context<P>,
    addr: SocketAddr,
    source_peer: Option<PeerId>,
    key: &PublicKey,
) -> Option<PeerId> {
    if let Some(pid) = source_peer {
        if ctx.peers[pid].key == *key {
            return Some(pid);
        }
        if !ctx.peers[pid].is_floating() && !ctx.peers[pid].is_dynamic() {
            return None;
        }
    }

    let mut resolve = None;
    let mut matched = None;
    for (pid, peer) in ctx.peers.iter().enumerate() {
        if !peer.is_floating() && !peer.matches_dynamic(addr) {
            continue;
        }
        if peer.key == *key {
            if peer.is_floating() {
                matched = Some(pid);
            } else {
                resolve = Some(pid);
            }
            break;
        }
    }

    if let Some(pid) = resolve {
        ctx.platform.resolve_peer(pid);
        return None;
    }
    matched
}

/// Handle an inbound handshake datagram.
pub(crate) fn handle<P: Platform>(
    ctx: &mut Context<P>,
    addr: SocketAddr,
    source_peer: Option<PeerId>,
    hs: &Handshake<'_>,
) {
    ctx.pool.maintain(ctx.now, &mut ctx.rng);

    if let Some(mode) = hs.field(RecordType::Mode) {
        if mode.len() != 1 || mode[0] != ctx.config.mode.as_byte() {
            debug!(%addr, "received handshake with wrong mode");
            return;
        }
    }
    if let Some(name) = hs.field(RecordType::ProtocolName) {
        if name != PROTOCOL_NAME.as_bytes() {
            debug!(%addr, "received handshake for wrong protocol");
            return;
        }
    }

    if !hs.has_field(RecordType::SenderKey, PUBLIC_KEY_SIZE) {
        debug!(%addr, "received handshake without sender key");
        return;
    }
    let sender = record_key(hs, RecordType::SenderKey);
    if sender == ctx.identity.public {
        debug!(%addr, "received handshake with own key as sender");
        return;
    }

    let Some(peer) = match_sender_key(ctx, addr, source_peer, &sender) else {
        debug!(%addr, "ignoring handshake (unknown key or unresolved host)");
        return;
    };

    if !hs.has_field(RecordType::SenderHandshakeKey, PUBLIC_KEY_SIZE) {
        debug!(%addr, "received handshake without sender handshake key");
        return;
    }

    if hs.handshake_type() > 1 {
        if !hs.has_field(RecordType::RecipientKey, PUBLIC_KEY_SIZE) {
            debug!(%addr, "received handshake reply without recipient key");
            return;
        }
        if record_key(hs, RecordType::RecipientKey) != ctx.identity.public {
            debug!(%addr, "received handshake with wrong recipient key");
            return;
        }
        if !hs.has_field(RecordType::RecipientHandshakeKey, PUBLIC_KEY_SIZE) {
            debug!(%addr, "received handshake reply without recipient handshake key");
            return;
        }
        if !hs.has_field(RecordType::Tag, HMAC_SIZE) {
            debug!(%addr, "received handshake reply without tag");
            return;
        }
    } else if hs.has_field(RecordType::RecipientKey, PUBLIC_KEY_SIZE)
        && record_key(hs, RecordType::RecipientKey) != ctx.identity.public
    {
        debug!(%addr, "received handshake with wrong recipient key");
        return;
    }

    let peer_handshake_key = record_key(hs, RecordType::SenderHandshakeKey);

    match hs.handshake_type() {
        1 => respond(ctx, addr, peer, &peer_handshake_key),
        2 | 3 => {
            let local_public = record_key(hs, RecordType::RecipientHandshakeKey);
            let Some(local_key) = ctx.pool.find_valid(ctx.now, &local_public).cloned() else {
                debug!(%addr, "received handshake reply for unknown handshake key");
                return;
            };

            let expected = if hs.handshake_type() == 2 {
                HandshakeProgress::Initiated
            } else {
                HandshakeProgress::Responded
            };
            if ctx.peers[peer].handshake_progress(&local_public) != Some(expected) {
                debug!(%addr, "received handshake reply out of sequence");
                return;
            }

            if hs.handshake_type() == 2 {
                debug!(%addr, "received handshake response");
                finish(ctx, addr, peer, &local_key, &peer_handshake_key, hs);
            } else {
                debug!(%addr, "received handshake finish");
                handle_finish(ctx, addr, peer, &local_key, &peer_handshake_key, hs);
            }
        }
        other => {
            debug!(%addr, handshake_type = other, "received handshake with unknown type");
        }
    }
}

/// A 32-byte record as a public key. Length-checked by the caller.
fn record_key(hs: &Handshake<'_>, record_type: RecordType) -> PublicKey {
    let mut bytes = [0u8; PUBLIC_KEY_SIZE];
    bytes.copy_from_slice(hs.field(record_type).unwrap_or(&[0; PUBLIC_KEY_SIZE]));
    PublicKey::from_bytes(bytes)
}

/// Answer a Type 1 init with a Type 2 response.
fn respond<P: Platform>(
    ctx: &mut Context<P>,
    addr: SocketAddr,
    peer: PeerId,
    peer_handshake_key: &PublicKey,
) {
    debug!(%addr, "responding handshake");

    let local_key = ctx.pool.current().clone();
    let keys = ExchangeKeys {
        x: *peer_handshake_key,
        y: local_key.public,
        a: ctx.peers[peer].key,
        b: ctx.identity.public,
    };

    let Some(secret) = compute_shared(&keys, &ctx.identity.secret, &local_key.secret, false) else {
        return;
    };
    let tag = hmac_sha256(&secret, &[keys.b.as_bytes(), keys.y.as_bytes()]);

    let mut builder = HandshakeBuilder::new(2);
    builder.add(RecordType::SenderKey, keys.b.as_bytes());
    builder.add(RecordType::RecipientKey, keys.a.as_bytes());
    builder.add(RecordType::SenderHandshakeKey, keys.y.as_bytes());
    builder.add(RecordType::RecipientHandshakeKey, keys.x.as_bytes());
    builder.add(RecordType::Tag, &tag);
    ctx.platform.send_packet(addr, builder.finish());

    let pool = &ctx.pool;
    ctx.peers[peer].upsert_handshake(pool, local_key.public, HandshakeProgress::Responded);
}

/// Verify a Type 2 response, send the Type 3 finish and establish.
fn finish<P: Platform>(
    ctx: &mut Context<P>,
    addr: SocketAddr,
    peer: PeerId,
    local_key: &HandshakeKey,
    peer_handshake_key: &PublicKey,
    hs: &Handshake<'_>,
) {
    let keys = ExchangeKeys {
        x: local_key.public,
        y: *peer_handshake_key,
        a: ctx.identity.public,
        b: ctx.peers[peer].key,
    };

    let Some(secret) = compute_shared(&keys, &ctx.identity.secret, &local_key.secret, true) else {
        return;
    };

    let received = hs.field(RecordType::Tag).unwrap_or_default();
    if !hmac_sha256_verify(received, &secret, &[keys.b.as_bytes(), keys.y.as_bytes()]) {
        warn!(%addr, "received invalid handshake response");
        return;
    }

    let tag = hmac_sha256(&secret, &[keys.a.as_bytes(), keys.x.as_bytes()]);
    let mut builder = HandshakeBuilder::new(3);
    builder.add(RecordType::SenderKey, keys.a.as_bytes());
    builder.add(RecordType::RecipientKey, keys.b.as_bytes());
    builder.add(RecordType::SenderHandshakeKey, keys.x.as_bytes());
    builder.add(RecordType::RecipientHandshakeKey, keys.y.as_bytes());
    builder.add(RecordType::Tag, &tag);
    ctx.platform.send_packet(addr, builder.finish());

    establish(ctx, peer, addr, true, &secret);
}

/// Verify a Type 3 finish and establish as responder.
fn handle_finish<P: Platform>(
    ctx: &mut Context<P>,
    addr: SocketAddr,
    peer: PeerId,
    local_key: &HandshakeKey,
    peer_handshake_key: &PublicKey,
    hs: &Handshake<'_>,
) {
    let keys = ExchangeKeys {
        x: *peer_handshake_key,
        y: local_key.public,
        a: ctx.peers[peer].key,
        b: ctx.identity.public,
    };

    let Some(secret) = compute_shared(&keys, &ctx.identity.secret, &local_key.secret, false) else {
        return;
    };

    let received = hs.field(RecordType::Tag).unwrap_or_default();
    if !hmac_sha256_verify(received, &secret, &[keys.a.as_bytes(), keys.x.as_bytes()]) {
        warn!(%addr, "received invalid handshake finish");
        return;
    }

    establish(ctx, peer, addr, false, &secret);
}

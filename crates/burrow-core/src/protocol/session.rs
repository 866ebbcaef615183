//! Session establishment, rollover and the data paths.
//!
//! Each peer owns a current and a previous session. A rekey leaves the
//! previous session decryptable until the first packet arrives over the
//! new one; the initiator also keeps *sending* on the previous session
//! until the responder proves the new one works (`handshakes_cleaned`).

use std::net::SocketAddr;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::buffer::Buffer;
use crate::context::{Context, Platform};
use crate::methods::{MethodEnv, MethodSession};
use crate::packet::{PacketType, PACKET_OVERHEAD};
use crate::task::PeerId;

/// One established session.
pub struct Session {
    /// Set once a packet decrypted over this session as current, proving
    /// the peer holds the key; scheduled handshakes are dropped then.
    pub(crate) handshakes_cleaned: bool,
    /// Set when a rekey for this session has been scheduled.
    pub(crate) refreshing: bool,
    /// The method's cipher state.
    pub(crate) method: Box<dyn MethodSession>,
}

/// The current and previous session of one peer.
///
/// If `previous` is valid then `current` is valid: rollover installs the
/// fresh session as current and retires the old current to previous.
#[derive(Default)]
pub struct SessionPair {
    pub(crate) current: Option<Session>,
    pub(crate) previous: Option<Session>,
}

impl SessionPair {
    pub(crate) fn current_valid(&self, now: std::time::Instant) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.method.is_valid(now))
    }

    pub(crate) fn previous_valid(&self, now: std::time::Instant) -> bool {
        self.previous
            .as_ref()
            .is_some_and(|s| s.method.is_valid(now))
    }
}

/// Install a fresh session after a verified handshake.
///
/// `secret` is the FHMQV session secret; `initiator` fixes the nonce
/// parity and which side drives rekeys.
pub(crate) fn establish<P: Platform>(
    ctx: &mut Context<P>,
    peer: PeerId,
    addr: SocketAddr,
    initiator: bool,
    secret: &Zeroizing<[u8; 32]>,
) {
    let now = ctx.now;
    info!(peer = ctx.peers[peer].name(), %addr, "peer authorized");

    if !claim_address(ctx, peer, addr) {
        warn!(%addr, "address already used by a fixed peer");
        reset_peer(ctx, peer);
        return;
    }

    // keep the old session decryptable across the rollover, unless a
    // previous one is still occupying the slot
    let pair = &mut ctx.peers[peer].sessions;
    if pair.current_valid(now) && !pair.previous_valid(now) {
        pair.previous = pair.current.take();
    } else {
        pair.current = None;
    }

    let method = ctx.method.session_init(
        &mut MethodEnv {
            now,
            timing: &ctx.timing,
            rng: &mut ctx.rng,
        },
        secret,
        initiator,
    );
    ctx.peers[peer].sessions.current = Some(Session {
        handshakes_cleaned: false,
        refreshing: false,
        method,
    });
    ctx.peers[peer].handshakes.clear();
    ctx.peers[peer].last_seen = Some(now);
    ctx.peers[peer].established = true;
    info!(peer = ctx.peers[peer].name(), "new session established");

    ctx.tasks.cancel_keepalives(peer);
    ctx.tasks.schedule_keepalive(peer, now + ctx.keepalive);

    // the responder speaks first so the initiator learns the session works
    if !initiator {
        let head_space = ctx.method.min_encrypt_head_space();
        send(ctx, peer, Buffer::alloc(0, head_space));
    }
}

/// Bind `addr` to `peer`. Fails when a fixed peer owns the address;
/// non-fixed owners lose it and are reset.
fn claim_address<P: Platform>(ctx: &mut Context<P>, peer: PeerId, addr: SocketAddr) -> bool {
    let mut stolen = Vec::new();
    for (pid, other) in ctx.peers.iter().enumerate() {
        if pid != peer && other.address == Some(addr) {
            if other.config.address.is_some() {
                return false;
            }
            stolen.push(pid);
        }
    }
    for pid in stolen {
        debug!(peer = ctx.peers[pid].name(), "peer lost its address");
        reset_peer(ctx, pid);
    }
    ctx.peers[peer].address = Some(addr);
    true
}

/// Drop all runtime state of a peer: sessions, handshake progress, timers
/// and any claimed (non-static) address.
pub(crate) fn reset_peer<P: Platform>(ctx: &mut Context<P>, peer: PeerId) {
    debug!(peer = ctx.peers[peer].name(), "resetting peer");
    ctx.tasks.cancel_peer(peer);
    ctx.peers[peer].reset();
}

/// Schedule a rekey once the current session wants one. Only the session's
/// initiator reports refresh, so both ends never dial at once.
pub(crate) fn check_refresh<P: Platform>(ctx: &mut Context<P>, peer: PeerId) {
    let now = ctx.now;
    let peer_state = &mut ctx.peers[peer];
    let Some(current) = peer_state.sessions.current.as_mut() else {
        return;
    };
    if current.refreshing || !current.method.want_refresh(now) {
        return;
    }
    current.refreshing = true;
    debug!(peer = peer_state.name(), "refreshing session");
    ctx.tasks.schedule_handshake(peer, now);
}

/// Encrypt and transmit a payload to a peer. Drops the buffer when no
/// valid session exists or encryption fails.
pub(crate) fn send<P: Platform>(ctx: &mut Context<P>, peer: PeerId, buffer: Buffer) {
    let now = ctx.now;
    if !ctx.peers[peer].sessions.current_valid(now) {
        return;
    }

    check_refresh(ctx, peer);

    let use_previous = {
        let pair = &ctx.peers[peer].sessions;
        let Some(current) = pair.current.as_ref() else {
            return;
        };
        current.method.is_initiator()
            && !current.handshakes_cleaned
            && pair.previous_valid(now)
    };
    if use_previous {
        debug!(peer = ctx.peers[peer].name(), "sending on previous session");
    }

    let pair = &mut ctx.peers[peer].sessions;
    let session = if use_previous {
        pair.previous.as_mut()
    } else {
        pair.current.as_mut()
    };
    let Some(session) = session else {
        return;
    };

    let mut packet = match session.method.encrypt(buffer) {
        Ok(packet) => packet,
        Err(err) => {
            debug!(peer = ctx.peers[peer].name(), %err, "encrypt failed");
            return;
        }
    };

    packet.push_head(PACKET_OVERHEAD);
    let head = packet.as_mut_slice();
    head[0] = PacketType::Data as u8;
    head[1] = 0;
    head[2] = 0;

    let Some(addr) = ctx.peers[peer].address else {
        return;
    };
    ctx.platform.send_packet(addr, packet);

    ctx.tasks.cancel_keepalives(peer);
    ctx.tasks.schedule_keepalive(peer, now + ctx.keepalive);
}

/// Decrypt an inbound data packet (outer header already stripped) and
/// deliver the payload.
pub(crate) fn handle_recv<P: Platform>(ctx: &mut Context<P>, peer: PeerId, packet: Buffer) {
    let now = ctx.now;

    if !ctx.peers[peer].established {
        debug!(
            peer = ctx.peers[peer].name(),
            "received unexpected packet, scheduling handshake"
        );
        ctx.tasks.schedule_handshake(peer, now);
        return;
    }
    if !ctx.peers[peer].sessions.current_valid(now) {
        return;
    }

    let mut via_current = false;
    let mut plain: Option<Buffer> = None;
    {
        let pair = &mut ctx.peers[peer].sessions;
        if let Some(previous) = pair.previous.as_mut() {
            if previous.method.is_valid(now) {
                if let Ok(payload) = previous.method.decrypt(now, packet.as_slice()) {
                    plain = Some(payload);
                }
            }
        }
        if plain.is_none() {
            let Some(current) = pair.current.as_mut() else {
                return;
            };
            match current.method.decrypt(now, packet.as_slice()) {
                Ok(payload) => {
                    plain = Some(payload);
                    via_current = true;
                }
                Err(err) => {
                    debug!(peer = ctx.peers[peer].name(), %err, "verification failed");
                    return;
                }
            }
        }
    }

    let mut send_confirm = false;
    if via_current {
        let cleaned = {
            let pair = &mut ctx.peers[peer].sessions;
            let Some(current) = pair.current.as_mut() else {
                return;
            };
            if !current.handshakes_cleaned {
                current.handshakes_cleaned = true;
                if current.method.is_initiator() {
                    send_confirm = true;
                }
                true
            } else {
                false
            }
        };
        if cleaned {
            debug!(peer = ctx.peers[peer].name(), "cleaning left handshakes");
            ctx.tasks.cancel_handshakes(peer);
        }
        if ctx.peers[peer].sessions.previous.is_some() {
            debug!(peer = ctx.peers[peer].name(), "invalidating old session");
            ctx.peers[peer].sessions.previous = None;
        }
        check_refresh(ctx, peer);
    }

    ctx.peers[peer].last_seen = Some(now);

    if send_confirm {
        let head_space = ctx.method.min_encrypt_head_space();
        send(ctx, peer, Buffer::alloc(0, head_space));
    }

    if let Some(payload) = plain {
        if payload.is_empty() {
            // keepalive: nothing to deliver
            return;
        }
        ctx.platform.deliver(payload);
    }
}

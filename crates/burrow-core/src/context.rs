//! The daemon context: all process-wide mutable state, threaded explicitly.
//!
//! There is no ambient singleton — the clock snapshot, the RNG, the
//! handshake-key pool and the peer table all live here, and the event loop
//! calls in with packets and timer expiries. The world outside the core is
//! reached only through [`Platform`].

use std::net::SocketAddr;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use burrow_crypto::ec25519::PublicKey;

use crate::buffer::Buffer;
use crate::config::{Config, ConfigError, TimingConfig};
use crate::framing::Handshake;
use crate::methods::{Method, MethodInfo, MethodRegistry};
use crate::packet::{PacketType, PACKET_OVERHEAD};
use crate::peer::Peer;
use crate::protocol::{self, HandshakePool, IdentityKeys, HANDSHAKE_RETRY};
use crate::task::{PeerId, TaskKind, TaskQueue};

/// Everything outside the core: the datagram socket, the TUN/TAP device
/// and the resolver. Implementations decide how packets actually move.
pub trait Platform {
    /// Transmit a datagram to a remote address.
    fn send_packet(&mut self, addr: SocketAddr, packet: Buffer);

    /// Hand a decrypted payload up to the TUN/TAP layer.
    fn deliver(&mut self, payload: Buffer);

    /// Start resolving a dynamic peer's hostname. Completion is reported
    /// back by re-driving the handshake once the address is known.
    fn resolve_peer(&mut self, peer: PeerId);
}

/// The single-threaded daemon core.
pub struct Context<P: Platform> {
    pub(crate) config: Config,
    pub(crate) timing: TimingConfig,
    pub(crate) keepalive: std::time::Duration,
    pub(crate) now: Instant,
    pub(crate) rng: StdRng,
    pub(crate) identity: IdentityKeys,
    pub(crate) pool: HandshakePool,
    pub(crate) method_info: MethodInfo,
    pub(crate) method: Box<dyn Method>,
    pub(crate) peers: Vec<Peer>,
    pub(crate) tasks: TaskQueue,
    pub(crate) platform: P,
}

impl<P: Platform> Context<P> {
    /// Build a context from a validated configuration.
    ///
    /// Peers without a usable key are disabled with a warning; a missing
    /// or invalid secret and an unknown method abort startup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the fatal configuration
    /// problem.
    pub fn new(config: Config, platform: P) -> Result<Self, ConfigError> {
        Self::with_rng(config, platform, StdRng::from_entropy(), Instant::now())
    }

    /// Like [`Context::new`] with an explicit RNG and clock, for
    /// deterministic tests.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the fatal configuration
    /// problem.
    pub fn with_rng(
        config: Config,
        platform: P,
        mut rng: StdRng,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        let secret = config.secret.as_deref().ok_or(ConfigError::MissingSecret)?;
        let identity = IdentityKeys::from_secret_hex(secret)?;

        let registry = MethodRegistry::builtin();
        let known = registry.names().any(|name| name == config.method);
        let (method_info, method) = registry
            .bind(&config.method, config.method_impl.as_deref())
            .ok_or_else(|| {
                if known {
                    ConfigError::NoMethodImpl(config.method.clone())
                } else {
                    ConfigError::UnknownMethod(config.method.clone())
                }
            })?;

        let mut peers = Vec::new();
        for peer_config in &config.peers {
            let Some(key_hex) = peer_config.key.as_deref() else {
                warn!(peer = peer_config.name.as_str(), "no key configured, disabling peer");
                continue;
            };
            let Ok(key) = PublicKey::from_hex(key_hex) else {
                warn!(peer = peer_config.name.as_str(), "invalid key configured, disabling peer");
                continue;
            };
            if key == identity.public {
                info!(peer = peer_config.name.as_str(), "found own key, ignoring peer");
                continue;
            }
            peers.push(Peer::new(peer_config.clone(), key));
        }

        let pool = HandshakePool::new(now, &mut rng);
        let timing = config.timing();
        let keepalive = config.keepalive();

        Ok(Self {
            config,
            timing,
            keepalive,
            now,
            rng,
            identity,
            pool,
            method_info,
            method,
            peers,
            tasks: TaskQueue::new(),
            platform,
        })
    }

    /// Advance the clock snapshot. The event loop calls this once per
    /// wakeup, before packets and timers are processed.
    pub fn set_now(&mut self, now: Instant) {
        self.now = now;
    }

    /// The current clock snapshot.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.now
    }

    /// The local public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.identity.public
    }

    /// The bound method's construction tag.
    #[must_use]
    pub fn method_info(&self) -> &MethodInfo {
        &self.method_info
    }

    /// The platform, for harnesses that need to drain it.
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Number of configured (enabled) peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Look up a peer by its configured name.
    #[must_use]
    pub fn peer_by_name(&self, name: &str) -> Option<PeerId> {
        self.peers.iter().position(|p| p.name() == name)
    }

    /// Access a peer's public state.
    #[must_use]
    pub fn peer(&self, peer: PeerId) -> &Peer {
        &self.peers[peer]
    }

    /// Whether a peer currently has a previous session alongside the
    /// current one (the rollover overlap window).
    #[must_use]
    pub fn peer_has_previous_session(&self, peer: PeerId) -> bool {
        self.peers[peer].sessions.previous.is_some()
    }

    /// Allocate a payload buffer with enough head space for the bound
    /// method and the packet header.
    #[must_use]
    pub fn payload_buffer(&self, payload: &[u8]) -> Buffer {
        Buffer::from_slice(payload, self.method.min_encrypt_head_space())
    }

    /// Send a payload to a peer. Requires an established session; the
    /// buffer is dropped otherwise.
    pub fn send_data(&mut self, peer: PeerId, buffer: Buffer) {
        protocol::session::send(self, peer, buffer);
    }

    /// Start a handshake with a peer immediately.
    pub fn start_handshake(&mut self, peer: PeerId) {
        protocol::handshake::start(self, peer);
    }

    /// Queue initial handshakes for all peers with a known address.
    pub fn schedule_initial_handshakes(&mut self) {
        for peer in 0..self.peers.len() {
            if self.peers[peer].address.is_some() || self.peers[peer].is_dynamic() {
                self.tasks.schedule_handshake(peer, self.now);
            }
        }
    }

    /// The next timer deadline, for the event loop's poll timeout.
    #[must_use]
    pub fn next_timeout(&self) -> Option<Instant> {
        self.tasks.next_due()
    }

    /// Run every expired timer: handshake retries and keepalives.
    pub fn handle_timeouts(&mut self) {
        while let Some((peer, kind)) = self.tasks.pop_due(self.now) {
            match kind {
                TaskKind::Handshake => {
                    trace!(peer = self.peers[peer].name(), "tending to handshake");
                    protocol::handshake::start(self, peer);
                    self.tasks.schedule_handshake(peer, self.now + HANDSHAKE_RETRY);
                }
                TaskKind::Keepalive => {
                    trace!(peer = self.peers[peer].name(), "sending keepalive");
                    let head_space = self.method.min_encrypt_head_space();
                    protocol::session::send(self, peer, Buffer::alloc(0, head_space));
                }
            }
        }
    }

    /// Outermost dispatch for an inbound datagram.
    ///
    /// Every path through here consumes the buffer exactly once: parsed
    /// handshakes and decrypted payloads move onward, everything else is
    /// freed when the buffer drops.
    pub fn handle_packet(&mut self, addr: SocketAddr, mut buffer: Buffer) {
        let Some(&tag) = buffer.as_slice().first() else {
            trace!(%addr, "empty datagram");
            return;
        };

        match PacketType::from_byte(tag) {
            Some(PacketType::Handshake) => match Handshake::parse(buffer.as_slice()) {
                Ok(handshake) => {
                    let source = self.peer_by_address(addr);
                    protocol::handshake::handle(self, addr, source, &handshake);
                }
                Err(err) => {
                    debug!(%addr, %err, "malformed handshake");
                }
            },
            Some(PacketType::Data) => {
                if buffer.len() < PACKET_OVERHEAD {
                    debug!(%addr, "truncated data packet");
                    return;
                }
                let Some(peer) = self.peer_by_address(addr) else {
                    debug!(%addr, "data packet from unknown address");
                    return;
                };
                buffer.pull_head(PACKET_OVERHEAD);
                protocol::session::handle_recv(self, peer, buffer);
            }
            None => {
                // the buffer is freed on drop, so even unassigned type
                // codes cannot leak it
                debug!(%addr, packet_type = tag, "received packet with invalid type");
            }
        }
    }

    fn peer_by_address(&self, addr: SocketAddr) -> Option<PeerId> {
        self.peers.iter().position(|p| p.address == Some(addr))
    }
}

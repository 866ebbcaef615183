//! Runtime peer state.
//!
//! A [`Peer`] combines its static configuration with everything the
//! protocol tracks at runtime: the claimed remote address, the
//! established flag, the current/previous session pair and the in-flight
//! handshake progress table.

use std::net::SocketAddr;
use std::time::Instant;

use burrow_crypto::ec25519::PublicKey;

use crate::config::PeerConfig;
use crate::protocol::session::SessionPair;
use crate::protocol::{HandshakePool, HandshakeProgress};

/// One configured peer with its runtime state.
pub struct Peer {
    pub(crate) config: PeerConfig,
    pub(crate) key: PublicKey,
    pub(crate) address: Option<SocketAddr>,
    pub(crate) established: bool,
    pub(crate) sessions: SessionPair,
    pub(crate) handshakes: Vec<HandshakeSlot>,
    pub(crate) last_seen: Option<Instant>,
}

/// Handshake progress for one (peer, local handshake key) pair.
///
/// Progress is keyed on the local ephemeral key so a response can still be
/// matched after the handshake-key pool rotated underneath it.
pub(crate) struct HandshakeSlot {
    pub(crate) local_key: PublicKey,
    pub(crate) progress: HandshakeProgress,
}

impl Peer {
    pub(crate) fn new(config: PeerConfig, key: PublicKey) -> Self {
        let address = config.address;
        Self {
            config,
            key,
            address,
            established: false,
            sessions: SessionPair::default(),
            handshakes: Vec::new(),
            last_seen: None,
        }
    }

    /// Display name from the configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Long-term public key.
    #[must_use]
    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    /// Whether a session is established.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Currently claimed remote address.
    #[must_use]
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Whether this peer may connect from any address.
    #[must_use]
    pub fn is_floating(&self) -> bool {
        self.config.is_floating()
    }

    /// Whether this peer's address is resolved at handshake time.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.config.is_dynamic()
    }

    /// Whether `addr` could belong to this dynamic peer. Before resolution
    /// only the port is checkable; after resolution the claimed address
    /// match in the caller takes precedence.
    pub(crate) fn matches_dynamic(&self, addr: SocketAddr) -> bool {
        self.is_dynamic() && self.config.port.map_or(true, |port| port == addr.port())
    }

    /// Record handshake progress under a local ephemeral key, replacing
    /// earlier progress for the same key and pruning slots whose keys have
    /// left the pool.
    pub(crate) fn upsert_handshake(
        &mut self,
        pool: &HandshakePool,
        local_key: PublicKey,
        progress: HandshakeProgress,
    ) {
        self.handshakes.retain(|slot| pool.contains(&slot.local_key));
        if let Some(slot) = self
            .handshakes
            .iter_mut()
            .find(|slot| slot.local_key == local_key)
        {
            slot.progress = progress;
        } else {
            self.handshakes.push(HandshakeSlot {
                local_key,
                progress,
            });
        }
    }

    /// Look up handshake progress for a local ephemeral key.
    pub(crate) fn handshake_progress(&self, local_key: &PublicKey) -> Option<HandshakeProgress> {
        self.handshakes
            .iter()
            .find(|slot| slot.local_key == *local_key)
            .map(|slot| slot.progress)
    }

    /// Drop all runtime state, keeping only the configuration. A statically
    /// configured address is restored; claimed addresses are forgotten.
    pub(crate) fn reset(&mut self) {
        self.established = false;
        self.sessions = SessionPair::default();
        self.handshakes.clear();
        self.address = self.config.address;
        self.last_seen = None;
    }
}

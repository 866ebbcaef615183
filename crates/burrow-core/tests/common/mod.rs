//! Shared two-node harness for end-to-end tests.
//!
//! Builds two deterministic contexts wired back-to-back: packets "sent"
//! by one node are collected by its fake platform and pumped into the
//! other node's dispatch, with the clock advanced manually.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use burrow_core::buffer::Buffer;
use burrow_core::config::{Config, PeerConfig};
use burrow_core::context::{Context, Platform};
use burrow_core::task::PeerId;
use burrow_crypto::ec25519::{scalar_base_mult, SecretKey};

/// Fake platform capturing everything the core pushes outward.
#[derive(Default)]
pub struct TestPlatform {
    pub sent: Vec<(SocketAddr, Vec<u8>)>,
    pub delivered: Vec<Vec<u8>>,
    pub resolved: Vec<PeerId>,
}

impl Platform for TestPlatform {
    fn send_packet(&mut self, addr: SocketAddr, packet: Buffer) {
        self.sent.push((addr, packet.as_slice().to_vec()));
    }

    fn deliver(&mut self, payload: Buffer) {
        self.delivered.push(payload.as_slice().to_vec());
    }

    fn resolve_peer(&mut self, peer: PeerId) {
        self.resolved.push(peer);
    }
}

pub struct Node {
    pub ctx: Context<TestPlatform>,
    pub addr: SocketAddr,
}

impl Node {
    /// Drain everything this node has queued for sending.
    pub fn outbound(&mut self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut self.ctx.platform_mut().sent)
    }

    /// Drain everything delivered to the TUN side.
    pub fn delivered(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.ctx.platform_mut().delivered)
    }

    /// Feed one raw datagram into the node.
    pub fn feed(&mut self, from: SocketAddr, datagram: &[u8]) {
        self.ctx.handle_packet(from, Buffer::from_slice(datagram, 0));
    }
}

pub fn identity_hex(seed_byte: u8) -> (String, String) {
    let secret = SecretKey::from_bytes([seed_byte; 32]).sanitize();
    let public = scalar_base_mult(&secret).encode();
    (secret.to_hex(), public.to_hex())
}

/// Two nodes configured for each other with static addresses.
pub fn make_pair(method: &str, now: Instant) -> (Node, Node) {
    let addr_a: SocketAddr = "192.0.2.1:1337".parse().unwrap();
    let addr_b: SocketAddr = "192.0.2.2:1337".parse().unwrap();

    let (secret_a, public_a) = identity_hex(0x21);
    let (secret_b, public_b) = identity_hex(0x42);

    let config_a = Config {
        secret: Some(secret_a),
        method: method.to_string(),
        peers: vec![PeerConfig {
            name: "b".into(),
            key: Some(public_b),
            address: Some(addr_b),
            ..PeerConfig::default()
        }],
        ..Config::default()
    };
    let config_b = Config {
        secret: Some(secret_b),
        method: method.to_string(),
        peers: vec![PeerConfig {
            name: "a".into(),
            key: Some(public_a),
            address: Some(addr_a),
            ..PeerConfig::default()
        }],
        ..Config::default()
    };

    let node_a = Node {
        ctx: Context::with_rng(
            config_a,
            TestPlatform::default(),
            StdRng::seed_from_u64(0xaaaa),
            now,
        )
        .unwrap(),
        addr: addr_a,
    };
    let node_b = Node {
        ctx: Context::with_rng(
            config_b,
            TestPlatform::default(),
            StdRng::seed_from_u64(0xbbbb),
            now,
        )
        .unwrap(),
        addr: addr_b,
    };
    (node_a, node_b)
}

/// A third node with its own identity, configured to talk to `target`
/// (which does not know it).
pub fn make_third_node(method: &str, now: Instant, target: SocketAddr) -> Node {
    let addr_c: SocketAddr = "192.0.2.3:1337".parse().unwrap();
    let (secret_c, _) = identity_hex(0x77);
    let (_, public_b) = identity_hex(0x42);

    let config = Config {
        secret: Some(secret_c),
        method: method.to_string(),
        peers: vec![PeerConfig {
            name: "target".into(),
            key: Some(public_b),
            address: Some(target),
            ..PeerConfig::default()
        }],
        ..Config::default()
    };

    Node {
        ctx: Context::with_rng(
            config,
            TestPlatform::default(),
            StdRng::seed_from_u64(0xcccc),
            now,
        )
        .unwrap(),
        addr: addr_c,
    }
}

/// Shuttle queued packets between the two nodes until both go quiet.
pub fn pump(a: &mut Node, b: &mut Node) {
    loop {
        let from_a = a.outbound();
        let from_b = b.outbound();
        if from_a.is_empty() && from_b.is_empty() {
            break;
        }
        for (_dest, datagram) in from_a {
            b.feed(a.addr, &datagram);
        }
        for (_dest, datagram) in from_b {
            a.feed(b.addr, &datagram);
        }
    }
}

/// Advance both clocks to the same instant.
pub fn advance(a: &mut Node, b: &mut Node, now: Instant, delta: Duration) -> Instant {
    let next = now + delta;
    a.ctx.set_now(next);
    b.ctx.set_now(next);
    next
}

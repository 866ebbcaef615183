//! # burrow-core
//!
//! Protocol core of the burrow tunnel daemon: a point-to-point layer-2/3
//! VPN carrying datagrams between two peers identified by long-lived
//! ec25519 keys.
//!
//! This crate provides:
//! - The EC25519-FHMQVC session protocol (three-message mutual
//!   authentication and key agreement)
//! - The record layer: nonce discipline, reorder window, session
//!   selection, keepalives
//! - The method registry: pluggable authenticated-encryption
//!   constructions behind a uniform capability set
//! - Peer and session lifecycle state
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        Context                             │
//! │  (config, clock, identity, handshake pool, peers, timers)  │
//! ├────────────────────────────────────────────────────────────┤
//! │            Protocol (EC25519-FHMQVC, sessions)             │
//! ├────────────────────────────────────────────────────────────┤
//! │          Methods (record layer + AEAD construction)        │
//! ├────────────────────────────────────────────────────────────┤
//! │             Framing (packet tags, handshake TLV)           │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The core is single-threaded and run-to-completion: every operation is
//! driven from one event loop, the clock is an explicit snapshot on the
//! [`Context`], and the world outside (socket, TUN device, resolver) is
//! reached only through the [`Platform`] trait.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod config;
pub mod context;
pub mod framing;
pub mod methods;
pub mod packet;
pub mod peer;
pub mod protocol;
pub mod task;

pub use buffer::Buffer;
pub use config::{Config, ConfigError, Mode, PeerConfig, TimingConfig};
pub use context::{Context, Platform};
pub use packet::{PacketType, PACKET_OVERHEAD};
pub use task::{PeerId, TaskKind};

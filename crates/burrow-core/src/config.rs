//! Daemon configuration.
//!
//! The structs here deserialize from the daemon's TOML front end (parsed by
//! the CLI) and from test fixtures. Durations are plain integers in the
//! unit the option is specified in: seconds for key lifetimes, seconds for
//! the reorder and keepalive windows (their effects are applied in
//! milliseconds internally).

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunnel mode: layer-2 (TAP) or layer-3 (TUN) framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ethernet frames
    Tap,
    /// IP packets
    Tun,
}

impl Mode {
    /// One-byte wire encoding for the handshake `Mode` record.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Tap => 0,
            Self::Tun => 1,
        }
    }
}

/// Configuration errors that abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No secret key configured
    #[error("no secret key configured")]
    MissingSecret,

    /// Secret key was not 64 hex digits
    #[error("invalid secret key")]
    InvalidSecret,

    /// The configured method name is not registered
    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    /// The configured method implementation is not available
    #[error("no available implementation for method `{0}`")]
    NoMethodImpl(String),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tunnel mode; both peers must agree.
    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// Long-term secret key, 64 hex digits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Selected AEAD construction name.
    #[serde(default = "default_method")]
    pub method: String,

    /// Force a specific implementation of the selected method instead of
    /// the first available one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_impl: Option<String>,

    /// Seconds a session remains decryptable after establishment.
    #[serde(default = "default_key_valid")]
    pub key_valid: u64,

    /// Seconds after which the initiator begins a rekey.
    #[serde(default = "default_key_refresh")]
    pub key_refresh: u64,

    /// Maximum random subtraction from `key_refresh`, in seconds, to keep
    /// many tunnels from rekeying in lockstep.
    #[serde(default = "default_key_refresh_splay")]
    pub key_refresh_splay: u64,

    /// Maximum seconds since the last accepted packet for an out-of-order
    /// packet to still be accepted.
    #[serde(default = "default_reorder_time")]
    pub reorder_time: u64,

    /// Maximum positions a packet may lag behind the newest accepted one.
    #[serde(default = "default_reorder_count")]
    pub reorder_count: u16,

    /// Seconds between outbound keepalives.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,

    /// Configured peers.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// A configured peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Display name, used in logs.
    pub name: String,

    /// Long-term public key, 64 hex digits. A peer without a key is
    /// disabled at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Fixed remote address. A peer with neither `address` nor `hostname`
    /// floats: it may connect from anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddr>,

    /// Remote hostname, resolved at handshake time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Remote port, used together with `hostname`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// The record-layer timing parameters, derived from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct TimingConfig {
    /// Session validity window.
    pub key_valid: Duration,
    /// Rekey point for the initiator.
    pub key_refresh: Duration,
    /// Maximum random subtraction from `key_refresh`.
    pub key_refresh_splay: Duration,
    /// Freshness window for out-of-order acceptance.
    pub reorder_time: Duration,
    /// Reorder window depth in packet positions.
    pub reorder_count: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            secret: None,
            method: default_method(),
            method_impl: None,
            key_valid: default_key_valid(),
            key_refresh: default_key_refresh(),
            key_refresh_splay: default_key_refresh_splay(),
            reorder_time: default_reorder_time(),
            reorder_count: default_reorder_count(),
            keepalive_interval: default_keepalive_interval(),
            peers: Vec::new(),
        }
    }
}

impl Config {
    /// The record-layer timing parameters.
    ///
    /// `reorder_count` is capped at 64, the depth of the seen-bitmap.
    #[must_use]
    pub fn timing(&self) -> TimingConfig {
        TimingConfig {
            key_valid: Duration::from_secs(self.key_valid),
            key_refresh: Duration::from_secs(self.key_refresh),
            key_refresh_splay: Duration::from_secs(self.key_refresh_splay),
            reorder_time: Duration::from_secs(self.reorder_time),
            reorder_count: self.reorder_count.min(64),
        }
    }

    /// Interval between outbound keepalives.
    #[must_use]
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval)
    }
}

fn default_mode() -> Mode {
    Mode::Tap
}

fn default_method() -> String {
    "salsa2012+poly1305".to_string()
}

fn default_key_valid() -> u64 {
    3600
}

fn default_key_refresh() -> u64 {
    3600
}

fn default_key_refresh_splay() -> u64 {
    600
}

fn default_reorder_time() -> u64 {
    10
}

fn default_reorder_count() -> u16 {
    64
}

fn default_keepalive_interval() -> u64 {
    10
}

/// Extract the secret key from a key file.
///
/// The format is a line reading `secret` followed by 64 hex digits;
/// quoting and a trailing semicolon are tolerated, comments (`#`) and
/// other lines are ignored.
///
/// # Errors
///
/// Returns [`ConfigError::MissingSecret`] if no `secret` line exists and
/// [`ConfigError::InvalidSecret`] if the value is not 64 hex digits.
pub fn parse_secret_file(contents: &str) -> Result<String, ConfigError> {
    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if let Some(value) = line.strip_prefix("secret") {
            let value = value
                .trim()
                .trim_end_matches(';')
                .trim_matches('"')
                .trim();
            if value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Ok(value.to_ascii_lowercase());
            }
            return Err(ConfigError::InvalidSecret);
        }
    }
    Err(ConfigError::MissingSecret)
}

impl PeerConfig {
    /// Whether this peer floats (no fixed address, no hostname).
    #[must_use]
    pub fn is_floating(&self) -> bool {
        self.address.is_none() && self.hostname.is_none()
    }

    /// Whether this peer's address is resolved dynamically.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.hostname.is_some()
    }
}

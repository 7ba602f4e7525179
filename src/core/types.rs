use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Vendor prefix prepended to the hardware MAC to form an EUI
pub const EUI_VENDOR_PREFIX: [u8; 2] = [0xBE, 0xEF];

/// 8-byte extended unique identifier of a node.
///
/// Bytes are kept in radio order, least significant octet first, which is
/// the order they appear in on the wire. [`fmt::Display`] prints them most
/// significant first, the way the identifier is usually written down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Eui(pub [u8; 8]);

impl Eui {
    /// Wraps raw wire-order bytes
    pub const fn new(bytes: [u8; 8]) -> Self {
        Eui(bytes)
    }

    /// Derives the identifier from a 6-byte hardware MAC address
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let mut bytes = [0u8; 8];
        for (i, octet) in mac.iter().rev().enumerate() {
            bytes[i] = *octet;
        }
        bytes[6] = EUI_VENDOR_PREFIX[1];
        bytes[7] = EUI_VENDOR_PREFIX[0];
        Eui(bytes)
    }

    /// Raw wire-order bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Short alias used to address this node in a targeted blink
    pub fn short_address(&self) -> ShortAddress {
        ShortAddress::from_le_bytes([self.0[0], self.0[1]])
    }
}

impl fmt::Display for Eui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// 2-byte alias for a node, valid for the lifetime of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortAddress(pub u16);

impl ShortAddress {
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        ShortAddress(u16::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for ShortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Role a node plays in the ranging network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed reference point, advertises and accepts ranging
    Anchor,
    /// Mobile node, scans known anchors and requests ranging
    Tag,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Anchor => f.write_str("anchor"),
            Role::Tag => f.write_str("tag"),
        }
    }
}

/// Inclusive window the scheduling jitter is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterWindow {
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub min: Duration,
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub max: Duration,
}

impl JitterWindow {
    pub const fn from_millis(min: u64, max: u64) -> Self {
        JitterWindow {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    /// Beacon window used by anchors
    pub const fn anchor() -> Self {
        JitterWindow::from_millis(5_000, 25_000)
    }

    /// Scan window used by tags
    pub const fn tag() -> Self {
        JitterWindow::from_millis(100, 500)
    }
}

/// What to do when a new peer arrives at a full table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Refuse the new peer with `CapacityExceeded`
    #[default]
    Reject,
    /// Drop the earliest inserted peer
    Oldest,
    /// Drop the peer with the lowest confidence, earliest on ties
    Weakest,
}

/// Configuration for a ranging node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Role selected at startup
    pub role: Role,
    /// Hardware MAC the EUI is derived from
    pub mac: [u8; 6],
    /// PAN identifier programmed into the radio
    pub network_id: u16,
    /// Jitter window between anchor beacons
    pub anchor_window: JitterWindow,
    /// Jitter window between tag scans
    pub tag_window: JitterWindow,
    /// Timeout handed to the tag's ranging-completion primitive
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub exchange_timeout: Duration,
    /// Number of peers tracked per table
    pub peer_capacity: usize,
    /// Policy for the peer that would overflow the table
    pub eviction: EvictionPolicy,
    /// Whether anchors send a range report after a successful exchange
    pub report_ranges: bool,
    /// Antenna delay applied when nothing has been persisted yet
    pub default_antenna_delay: u16,
    /// Interval between ticks when driven by the service
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub tick_interval: Duration,
    /// Seed for the scheduling jitter, random when absent
    pub rng_seed: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            role: Role::Anchor,
            mac: [0; 6],
            network_id: super::DEFAULT_NETWORK_ID,
            anchor_window: JitterWindow::anchor(),
            tag_window: JitterWindow::tag(),
            exchange_timeout: Duration::from_millis(3000),
            peer_capacity: super::PEER_CAPACITY,
            eviction: EvictionPolicy::Reject,
            report_ranges: true,
            default_antenna_delay: super::DEFAULT_ANTENNA_DELAY,
            tick_interval: Duration::from_millis(1),
            rng_seed: None,
        }
    }
}

impl NodeConfig {
    /// Creates a default configuration for the given role and MAC
    pub fn new(role: Role, mac: [u8; 6]) -> Self {
        NodeConfig {
            role,
            mac,
            ..Default::default()
        }
    }

    /// Jitter window for the configured role
    pub fn window(&self) -> JitterWindow {
        match self.role {
            Role::Anchor => self.anchor_window,
            Role::Tag => self.tag_window,
        }
    }

    /// Identifier this node will program into its radio
    pub fn eui(&self) -> Eui {
        Eui::from_mac(self.mac)
    }

    /// Checks the configuration for values the state machines cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, window) in [("anchor_window", self.anchor_window), ("tag_window", self.tag_window)] {
            if window.max.is_zero() {
                return Err(Error::config(format!("{} must not be empty", name)));
            }
            if window.min > window.max {
                return Err(Error::config(format!(
                    "{} min {:?} exceeds max {:?}",
                    name, window.min, window.max
                )));
            }
        }
        if self.peer_capacity == 0 {
            return Err(Error::config("peer_capacity must be at least 1"));
        }
        if self.exchange_timeout.is_zero() {
            return Err(Error::config("exchange_timeout must be non-zero"));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::config("tick_interval must be non-zero"));
        }
        Ok(())
    }
}

//! Core types for the ranging core
//!
//! Identities, configuration and the crate-wide error type.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{
    EvictionPolicy,
    Eui,
    JitterWindow,
    NodeConfig,
    Role,
    ShortAddress,
};

/// Number of peers each role tracks
pub const PEER_CAPACITY: usize = 8;

/// Antenna delay used until a calibrated value has been stored
pub const DEFAULT_ANTENNA_DELAY: u16 = 16436;

/// PAN identifier shared by all nodes
pub const DEFAULT_NETWORK_ID: u16 = 10;

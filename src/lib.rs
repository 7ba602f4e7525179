//! UWB RTLS: anchor/tag two-way ranging sessions
//!
//! Anchors periodically advertise themselves with beacon blinks and answer
//! targeted blinks with a ranging exchange. Tags collect the anchors they
//! hear and range against each one on a randomized schedule, tracking a
//! smoothed reliability score per anchor. Radio access goes through the
//! [`radio::RadioDriver`] trait so the state machines run against real
//! hardware or a scripted mock.
pub mod core;
pub mod peers;
pub mod protocol;
pub mod radio;
pub mod ranging;
pub mod service;
pub mod store;
pub mod util;

// Re-export commonly used items
pub use self::core::{Error, Eui, NodeConfig, Result, Role, ShortAddress};
pub use self::ranging::{Node, PeerSnapshot, RangingRole};
pub use self::service::{NodeService, ServiceHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

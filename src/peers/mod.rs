//! Peer tracking module
//!
//! A bounded table of known peers, shared by both roles with role-specific
//! payloads: measured distances on anchors, reliability scores on tags.

pub mod records;
pub mod table;

pub use self::records::{AnchorLink, Reliability, TagDistance, MAX_RELIABILITY};
pub use self::table::{PeerTable, Upsert};

/// Payload stored per peer
pub trait PeerPayload {
    /// Confidence in this peer on a 0-100 scale, used by the `Weakest`
    /// eviction policy
    fn confidence(&self) -> u8;
}

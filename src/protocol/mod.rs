//! Wire protocol module
//!
//! Frame layouts shared by anchors and tags, and the stateless codec that
//! moves between them and raw radio payloads.

pub mod codec;
pub mod frame;

pub use self::codec::{
    decode,
    encode_beacon_blink,
    encode_range_report,
    encode_ranging_initiation,
    encode_targeted_blink,
    range_to_cm,
};
pub use self::frame::{Frame, FrameError};

/// Wrapping per-node frame sequence counter
#[derive(Debug, Default, Clone)]
pub struct SequenceCounter(u8);

impl SequenceCounter {
    /// Returns the next sequence number
    pub fn next(&mut self) -> u8 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }
}

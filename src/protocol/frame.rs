use thiserror::Error;

use crate::core::{Eui, ShortAddress};

/// Frame control byte of a blink
pub const BLINK: u8 = 0xC5;
/// Frame control byte of a data frame
pub const DATA: u8 = 0x41;
/// Addressing mode of a data frame with a short source and long destination
pub const SHORT_SRC_LONG_DEST: u8 = 0x8C;

/// Blink header: no battery status reported
pub const NO_BATTERY_STATUS: u8 = 0x03;
/// Blink header: no extended identifier follows
pub const NO_EX_ID: u8 = 0x40;
/// Blink extension: the sending tag is listening for a ranging initiation
pub const TAG_LISTENING_NOW: u8 = 0x01;
/// Blink extension: the sender is an anchor advertising itself
pub const DEVICE_IS_ANCHOR: u8 = 0x03;

/// Data subtype of a range report sent from an anchor to a tag
pub const RANGE_REPORT: u8 = 0xA1;
/// Function code of a ranging initiation
pub const RANGING_INITIATION: u8 = 0x20;

/// Length of an anchor beacon blink
pub const BEACON_LEN: usize = 12;
/// Length of a tag's targeted blink
pub const TARGETED_BLINK_LEN: usize = 14;
/// Length of a range report
pub const RANGE_REPORT_LEN: usize = 12;
/// Minimum length of a ranging initiation
pub const RANGING_INITIATION_LEN: usize = 18;

/// A decoded radio frame.
///
/// Frames are transient: built, transmitted and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Anchor presence advertisement
    Beacon {
        /// Sender's sequence number
        seq: u8,
        /// Advertising anchor
        eui: Eui,
        /// Battery / extended-id header
        flags: u8,
    },
    /// Tag blink naming one anchor it wants to range with
    TargetedBlink {
        /// Sender's sequence number
        seq: u8,
        /// Requesting tag
        eui: Eui,
        /// Battery / extended-id header
        flags: u8,
        /// Short address of the anchor being asked
        target: ShortAddress,
    },
    /// Distance an anchor measured, reported back to the tag
    RangeReport {
        /// Reporting anchor
        eui: Eui,
        /// Measured distance in centimetres
        range_cm: u16,
    },
    /// Anchor's answer to a targeted blink, opening the ranging exchange
    RangingInitiation {
        /// Sender's sequence number
        seq: u8,
        /// PAN identifier
        pan: u16,
        /// Tag being answered
        destination: Eui,
        /// Anchor's short address for this exchange
        source: ShortAddress,
        /// Short address the tag should adopt for this exchange
        assigned: ShortAddress,
    },
}

impl Frame {
    /// Identity of the node that sent this frame, when the frame carries it
    pub fn sender(&self) -> Option<Eui> {
        match self {
            Frame::Beacon { eui, .. }
            | Frame::TargetedBlink { eui, .. }
            | Frame::RangeReport { eui, .. } => Some(*eui),
            Frame::RangingInitiation { .. } => None,
        }
    }

    /// Human-readable frame kind for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Beacon { .. } => "beacon",
            Frame::TargetedBlink { .. } => "targeted-blink",
            Frame::RangeReport { .. } => "range-report",
            Frame::RangingInitiation { .. } => "ranging-initiation",
        }
    }
}

/// Reasons a frame is rejected as malformed
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Nothing was received
    #[error("frame is empty")]
    Empty,
    /// Length does not match the layout implied by the type bytes
    #[error("{kind} frame has length {actual}, expected {expected}")]
    Length {
        /// Frame kind the type bytes announced
        kind: &'static str,
        /// Required byte count
        expected: usize,
        /// Received byte count
        actual: usize,
    },
    /// Frame control byte is not one this protocol uses
    #[error("unknown frame type {0:#04x}")]
    UnknownType(u8),
    /// Frame control byte is known but the subtype is not
    #[error("unknown subtype {subtype:#04x} for frame type {frame_type:#04x}")]
    UnknownSubtype {
        /// Frame control byte
        frame_type: u8,
        /// Unrecognised subtype byte
        subtype: u8,
    },
}

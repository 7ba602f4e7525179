use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::{Eui, ShortAddress};
use super::frame::*;

const BLINK_FLAGS: u8 = NO_BATTERY_STATUS | NO_EX_ID;

/// Builds an anchor's presence beacon
pub fn encode_beacon_blink(eui: &Eui, seq: u8) -> Bytes {
    beacon_with_flags(eui, seq, BLINK_FLAGS)
}

/// Builds a tag's blink asking the anchor at `target` to start ranging
pub fn encode_targeted_blink(eui: &Eui, seq: u8, target: ShortAddress) -> Bytes {
    targeted_blink_with_flags(eui, seq, BLINK_FLAGS, target)
}

/// Builds an anchor's range report
pub fn encode_range_report(eui: &Eui, range_cm: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(RANGE_REPORT_LEN);
    buf.put_u8(DATA);
    buf.put_u8(RANGE_REPORT);
    buf.put_slice(eui.as_bytes());
    buf.put_u16_le(range_cm);
    buf.freeze()
}

/// Builds the ranging initiation a driver sends in answer to a targeted blink
pub fn encode_ranging_initiation(
    seq: u8,
    pan: u16,
    destination: &Eui,
    source: ShortAddress,
    assigned: ShortAddress,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(RANGING_INITIATION_LEN);
    buf.put_u8(DATA);
    buf.put_u8(SHORT_SRC_LONG_DEST);
    buf.put_u8(seq);
    buf.put_u16_le(pan);
    buf.put_slice(destination.as_bytes());
    buf.put_u16_le(source.0);
    buf.put_u8(RANGING_INITIATION);
    buf.put_u16_le(assigned.0);
    buf.freeze()
}

/// Converts metres to the whole centimetres carried by a range report
pub fn range_to_cm(meters: f64) -> u16 {
    if !meters.is_finite() || meters <= 0.0 {
        return 0;
    }
    let cm = (meters * 100.0).round();
    if cm >= f64::from(u16::MAX) {
        u16::MAX
    } else {
        cm as u16
    }
}

fn beacon_with_flags(eui: &Eui, seq: u8, flags: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(BEACON_LEN);
    put_blink_header(&mut buf, eui, seq, flags);
    buf.put_u8(DEVICE_IS_ANCHOR);
    buf.freeze()
}

fn targeted_blink_with_flags(eui: &Eui, seq: u8, flags: u8, target: ShortAddress) -> Bytes {
    let mut buf = BytesMut::with_capacity(TARGETED_BLINK_LEN);
    put_blink_header(&mut buf, eui, seq, flags);
    buf.put_u8(TAG_LISTENING_NOW);
    buf.put_u16_le(target.0);
    buf.freeze()
}

fn put_blink_header(buf: &mut BytesMut, eui: &Eui, seq: u8, flags: u8) {
    buf.put_u8(BLINK);
    buf.put_u8(seq);
    buf.put_slice(eui.as_bytes());
    buf.put_u8(flags);
}

/// Classifies a received byte sequence.
///
/// Anything that fails a type or length check comes back as a
/// [`FrameError`]; callers drop those frames and carry on.
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    let frame_type = *bytes.first().ok_or(FrameError::Empty)?;
    match frame_type {
        BLINK => decode_blink(bytes),
        DATA => decode_data(bytes),
        other => Err(FrameError::UnknownType(other)),
    }
}

fn decode_blink(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < BEACON_LEN {
        return Err(FrameError::Length {
            kind: "blink",
            expected: BEACON_LEN,
            actual: bytes.len(),
        });
    }

    let mut buf = &bytes[1..];
    let seq = buf.get_u8();
    let eui = get_eui(&mut buf);
    let flags = buf.get_u8();
    let marker = buf.get_u8();

    match marker {
        DEVICE_IS_ANCHOR => {
            expect_len("beacon", bytes.len(), BEACON_LEN)?;
            Ok(Frame::Beacon { seq, eui, flags })
        }
        TAG_LISTENING_NOW => {
            expect_len("targeted-blink", bytes.len(), TARGETED_BLINK_LEN)?;
            let target = ShortAddress(buf.get_u16_le());
            Ok(Frame::TargetedBlink { seq, eui, flags, target })
        }
        subtype => Err(FrameError::UnknownSubtype {
            frame_type: BLINK,
            subtype,
        }),
    }
}

fn decode_data(bytes: &[u8]) -> Result<Frame, FrameError> {
    let subtype = *bytes.get(1).ok_or(FrameError::Length {
        kind: "data",
        expected: 2,
        actual: bytes.len(),
    })?;

    match subtype {
        RANGE_REPORT => {
            expect_len("range-report", bytes.len(), RANGE_REPORT_LEN)?;
            let mut buf = &bytes[2..];
            let eui = get_eui(&mut buf);
            let range_cm = buf.get_u16_le();
            Ok(Frame::RangeReport { eui, range_cm })
        }
        SHORT_SRC_LONG_DEST => {
            if bytes.len() < RANGING_INITIATION_LEN {
                return Err(FrameError::Length {
                    kind: "ranging-initiation",
                    expected: RANGING_INITIATION_LEN,
                    actual: bytes.len(),
                });
            }
            let mut buf = &bytes[2..];
            let seq = buf.get_u8();
            let pan = buf.get_u16_le();
            let destination = get_eui(&mut buf);
            let source = ShortAddress(buf.get_u16_le());
            let function = buf.get_u8();
            if function != RANGING_INITIATION {
                return Err(FrameError::UnknownSubtype {
                    frame_type: DATA,
                    subtype: function,
                });
            }
            let assigned = ShortAddress(buf.get_u16_le());
            Ok(Frame::RangingInitiation {
                seq,
                pan,
                destination,
                source,
                assigned,
            })
        }
        subtype => Err(FrameError::UnknownSubtype {
            frame_type: DATA,
            subtype,
        }),
    }
}

fn expect_len(kind: &'static str, actual: usize, expected: usize) -> Result<(), FrameError> {
    if actual == expected {
        Ok(())
    } else {
        Err(FrameError::Length { kind, expected, actual })
    }
}

fn get_eui(buf: &mut &[u8]) -> Eui {
    let mut eui = [0u8; 8];
    buf.copy_to_slice(&mut eui);
    Eui(eui)
}

impl Frame {
    /// Serializes the frame into its wire layout
    pub fn encode(&self) -> Bytes {
        match *self {
            Frame::Beacon { seq, eui, flags } => beacon_with_flags(&eui, seq, flags),
            Frame::TargetedBlink {
                seq,
                eui,
                flags,
                target,
            } => targeted_blink_with_flags(&eui, seq, flags, target),
            Frame::RangeReport { eui, range_cm } => encode_range_report(&eui, range_cm),
            Frame::RangingInitiation {
                seq,
                pan,
                destination,
                source,
                assigned,
            } => encode_ranging_initiation(seq, pan, &destination, source, assigned),
        }
    }
}

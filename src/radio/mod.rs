//! Radio driver interface
//!
//! The ranging core never touches the transceiver directly. Timestamp
//! capture, antenna-delay compensation and the time-of-flight arithmetic
//! all live behind [`RadioDriver`].

pub mod mock;

use std::time::Duration;

use bytes::Bytes;

use crate::core::{Eui, Result, ShortAddress};

pub use self::mock::MockRadio;

/// Result of one of the driver's two-way ranging primitives
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeOutcome {
    /// Whether the exchange completed
    pub success: bool,
    /// Computed distance in metres, meaningful only on success
    pub range: f64,
}

impl RangeOutcome {
    pub fn success(range: f64) -> Self {
        RangeOutcome { success: true, range }
    }

    pub fn failure() -> Self {
        RangeOutcome {
            success: false,
            range: 0.0,
        }
    }
}

/// Operations the ranging core needs from an impulse-radio UWB driver.
///
/// `wait_for_transmission`, `receive_frame` and the ranging primitives may
/// block, but only for the driver's own bounded timeouts.
pub trait RadioDriver {
    /// Identifier currently programmed into the transceiver
    fn eui(&self) -> Eui;

    fn set_eui(&mut self, eui: Eui) -> Result<()>;

    fn set_device_address(&mut self, address: ShortAddress) -> Result<()>;

    fn set_network_id(&mut self, network_id: u16) -> Result<()>;

    /// Applies the antenna delay calibration constant
    fn set_antenna_delay(&mut self, delay: u16) -> Result<()>;

    /// Loads `frame` and starts transmitting it
    fn start_transmit(&mut self, frame: &[u8]) -> Result<()>;

    /// Waits until the current transmission has left the antenna
    fn wait_for_transmission(&mut self) -> Result<()>;

    /// Enables the receiver
    fn start_receive(&mut self) -> Result<()>;

    /// Returns the next received payload, or `None` if the receive window
    /// closed without one
    fn receive_frame(&mut self) -> Result<Option<Bytes>>;

    /// Answers a tag's targeted blink with a ranging initiation, assigning it
    /// `tag_address` for the exchange
    fn transmit_ranging_initiation(&mut self, tag: &Eui, tag_address: ShortAddress) -> Result<()>;

    /// Anchor side of the exchange: accepts the tag's poll and computes the range
    fn anchor_range_accept(&mut self) -> Result<RangeOutcome>;

    /// Tag side of the exchange against the anchor at `anchor`
    fn tag_range_infrastructure(&mut self, anchor: ShortAddress, timeout: Duration) -> Result<RangeOutcome>;
}

impl<R: RadioDriver + ?Sized> RadioDriver for Box<R> {
    fn eui(&self) -> Eui {
        (**self).eui()
    }

    fn set_eui(&mut self, eui: Eui) -> Result<()> {
        (**self).set_eui(eui)
    }

    fn set_device_address(&mut self, address: ShortAddress) -> Result<()> {
        (**self).set_device_address(address)
    }

    fn set_network_id(&mut self, network_id: u16) -> Result<()> {
        (**self).set_network_id(network_id)
    }

    fn set_antenna_delay(&mut self, delay: u16) -> Result<()> {
        (**self).set_antenna_delay(delay)
    }

    fn start_transmit(&mut self, frame: &[u8]) -> Result<()> {
        (**self).start_transmit(frame)
    }

    fn wait_for_transmission(&mut self) -> Result<()> {
        (**self).wait_for_transmission()
    }

    fn start_receive(&mut self) -> Result<()> {
        (**self).start_receive()
    }

    fn receive_frame(&mut self) -> Result<Option<Bytes>> {
        (**self).receive_frame()
    }

    fn transmit_ranging_initiation(&mut self, tag: &Eui, tag_address: ShortAddress) -> Result<()> {
        (**self).transmit_ranging_initiation(tag, tag_address)
    }

    fn anchor_range_accept(&mut self) -> Result<RangeOutcome> {
        (**self).anchor_range_accept()
    }

    fn tag_range_infrastructure(&mut self, anchor: ShortAddress, timeout: Duration) -> Result<RangeOutcome> {
        (**self).tag_range_infrastructure(anchor, timeout)
    }
}

//! Ranging session module
//!
//! The two role state machines, the jitter scheduler they share, and the
//! runtime-selected [`Node`] that wraps whichever role this device plays.
//! Both roles are driven by repeated calls to `tick()`; nothing here spawns
//! threads or timers.

pub mod anchor;
pub mod schedule;
pub mod tag;

pub use self::anchor::{Advertiser, AdvertiserState};
pub use self::schedule::Scheduler;
pub use self::tag::{Requester, RequesterState};

use serde::Serialize;
use tracing::info;

use crate::core::{Eui, NodeConfig, Result, Role};
use crate::peers::{AnchorLink, TagDistance};
use crate::radio::RadioDriver;
use crate::util::{Clock, MonotonicClock};

/// Counters kept by each role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleStats {
    /// Beacons sent (anchor) or scans run (tag)
    pub cycles: u64,
    pub exchanges_succeeded: u64,
    pub exchanges_failed: u64,
    /// Malformed or misaddressed frames ignored
    pub frames_dropped: u64,
    /// New peers refused because the table was full
    pub peers_rejected: u64,
}

/// Read-only copy of a role's peer table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PeerSnapshot {
    /// Anchor's table of ranged tags
    Tags(Vec<(Eui, TagDistance)>),
    /// Tag's table of heard anchors
    Anchors(Vec<(Eui, AnchorLink)>),
}

impl PeerSnapshot {
    pub fn len(&self) -> usize {
        match self {
            PeerSnapshot::Tags(tags) => tags.len(),
            PeerSnapshot::Anchors(anchors) => anchors.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Behaviour shared by both roles
pub trait RangingRole {
    fn role(&self) -> Role;

    /// Identity this node advertises
    fn eui(&self) -> Eui;

    /// Runs one cooperative step
    fn tick(&mut self);

    /// Name of the current state, for status reporting
    fn state_name(&self) -> &'static str;

    /// Copy of the peer table for reporting
    fn snapshot(&self) -> PeerSnapshot;

    fn stats(&self) -> RoleStats;

    /// Reapplies the antenna delay calibration to the radio
    fn set_antenna_delay(&mut self, delay: u16) -> Result<()>;
}

/// A ranging node in whichever role it was configured for
pub enum Node<R, C = MonotonicClock> {
    Anchor(Advertiser<R, C>),
    Tag(Requester<R, C>),
}

impl<R: RadioDriver, C: Clock> Node<R, C> {
    /// Programs the radio with this node's identity and calibration and
    /// builds the configured role
    pub fn new(config: &NodeConfig, mut radio: R, clock: C, antenna_delay: u16) -> Result<Self> {
        config.validate()?;

        let eui = config.eui();
        radio.set_eui(eui)?;
        radio.set_device_address(eui.short_address())?;
        radio.set_network_id(config.network_id)?;
        radio.set_antenna_delay(antenna_delay)?;

        info!(
            role = %config.role,
            eui = %eui,
            address = %eui.short_address(),
            antenna_delay,
            "Radio configured"
        );

        Ok(match config.role {
            Role::Anchor => Node::Anchor(Advertiser::new(radio, clock, config)),
            Role::Tag => Node::Tag(Requester::new(radio, clock, config)),
        })
    }

    /// The anchor role, if this node is an anchor
    pub fn as_anchor(&self) -> Option<&Advertiser<R, C>> {
        match self {
            Node::Anchor(anchor) => Some(anchor),
            Node::Tag(_) => None,
        }
    }

    /// The tag role, if this node is a tag
    pub fn as_tag(&self) -> Option<&Requester<R, C>> {
        match self {
            Node::Tag(tag) => Some(tag),
            Node::Anchor(_) => None,
        }
    }

    fn inner(&self) -> &dyn RangingRole {
        match self {
            Node::Anchor(anchor) => anchor,
            Node::Tag(tag) => tag,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RangingRole {
        match self {
            Node::Anchor(anchor) => anchor,
            Node::Tag(tag) => tag,
        }
    }
}

impl<R: RadioDriver, C: Clock> RangingRole for Node<R, C> {
    fn role(&self) -> Role {
        self.inner().role()
    }

    fn eui(&self) -> Eui {
        self.inner().eui()
    }

    fn tick(&mut self) {
        self.inner_mut().tick()
    }

    fn state_name(&self) -> &'static str {
        self.inner().state_name()
    }

    fn snapshot(&self) -> PeerSnapshot {
        self.inner().snapshot()
    }

    fn stats(&self) -> RoleStats {
        self.inner().stats()
    }

    fn set_antenna_delay(&mut self, delay: u16) -> Result<()> {
        self.inner_mut().set_antenna_delay(delay)
    }
}

use tracing::{debug, info, trace, warn};

use crate::core::{Error, Eui, NodeConfig, Result, Role};
use crate::peers::{PeerTable, TagDistance, Upsert};
use crate::protocol::{self, Frame, SequenceCounter};
use crate::radio::RadioDriver;
use crate::util::{Clock, MonotonicClock};
use super::{PeerSnapshot, RangingRole, RoleStats, Scheduler};

/// States of the advertiser (anchor) state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiserState {
    /// Constructed, clock not yet armed
    Idle,
    /// Waiting for the first beacon slot
    AwaitingBeaconWindow,
    /// Receiver enabled, waiting for a targeted blink
    Listening,
    /// Running an exchange with the given tag
    RangingInProgress {
        /// Tag being ranged
        tag: Eui,
    },
}

impl AdvertiserState {
    pub fn name(&self) -> &'static str {
        match self {
            AdvertiserState::Idle => "Idle",
            AdvertiserState::AwaitingBeaconWindow => "AwaitingBeaconWindow",
            AdvertiserState::Listening => "Listening",
            AdvertiserState::RangingInProgress { .. } => "RangingInProgress",
        }
    }
}

/// Anchor role: beacons periodically and ranges with tags that answer
pub struct Advertiser<R, C = MonotonicClock> {
    radio: R,
    clock: C,
    eui: Eui,
    state: AdvertiserState,
    scheduler: Scheduler,
    seq: SequenceCounter,
    tags: PeerTable<TagDistance>,
    report_ranges: bool,
    stats: RoleStats,
}

impl<R: RadioDriver, C: Clock> Advertiser<R, C> {
    /// Creates an idle advertiser around an already configured radio
    pub fn new(radio: R, clock: C, config: &NodeConfig) -> Self {
        let eui = radio.eui();
        Advertiser {
            radio,
            clock,
            eui,
            state: AdvertiserState::Idle,
            scheduler: Scheduler::new(config.anchor_window, config.rng_seed),
            seq: SequenceCounter::default(),
            tags: PeerTable::new(config.peer_capacity, config.eviction),
            report_ranges: config.report_ranges,
            stats: RoleStats::default(),
        }
    }

    pub fn state(&self) -> AdvertiserState {
        self.state
    }

    /// Tags ranged so far
    pub fn tags(&self) -> &PeerTable<TagDistance> {
        &self.tags
    }

    pub fn known_tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Tag at `index` in discovery order
    pub fn known_tag(&self, index: usize) -> Option<(Eui, TagDistance)> {
        self.tags.entry(index).map(|(eui, record)| (*eui, *record))
    }

    /// Timestamp of the next beacon, once armed
    pub fn next_beacon_due(&self) -> Option<u64> {
        self.scheduler.next_due()
    }

    /// Arms the beacon clock; called by the first tick if not called earlier
    pub fn start(&mut self) {
        if self.state != AdvertiserState::Idle {
            return;
        }
        let now = self.clock.now_ms();
        let delay = self.scheduler.arm(now);
        self.state = AdvertiserState::AwaitingBeaconWindow;
        info!(eui = %self.eui, delay_ms = delay, "Anchor started, first beacon scheduled");
    }

    /// Runs one cooperative step: the beacon if due, then one inbound poll
    pub fn tick(&mut self) {
        self.start();

        let now = self.clock.now_ms();
        if self.scheduler.is_due(now) {
            self.advertise(now);
        }

        if self.state == AdvertiserState::Listening {
            self.poll();
        }
    }

    fn advertise(&mut self, now: u64) {
        let beacon = protocol::encode_beacon_blink(&self.eui, self.seq.next());
        match self.radio.start_transmit(&beacon) {
            Ok(()) => {
                self.stats.cycles += 1;
                trace!(eui = %self.eui, "Beacon transmitted");
            }
            Err(e) => warn!(error = %e, "Failed to transmit beacon"),
        }

        let delay = self.scheduler.arm(now);
        debug!(delay_ms = delay, "Next beacon scheduled");

        self.listen();
    }

    fn listen(&mut self) {
        if let Err(e) = self.radio.start_receive() {
            warn!(error = %e, "Failed to enable receiver");
        }
        self.state = AdvertiserState::Listening;
    }

    fn poll(&mut self) {
        let bytes = match self.radio.receive_frame() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read received frame");
                return;
            }
        };

        match self.requesting_tag(&bytes) {
            Ok(tag) => self.range_with(tag),
            Err(e) => {
                self.stats.frames_dropped += 1;
                trace!(error = %e, len = bytes.len(), "Dropped frame");
            }
        }
    }

    /// Tag asking this anchor to range, if the frame is a blink addressed here
    fn requesting_tag(&self, bytes: &[u8]) -> Result<Eui> {
        match protocol::decode(bytes)? {
            Frame::TargetedBlink { eui, target, .. } if target == self.eui.short_address() => Ok(eui),
            _ => Err(Error::AddressMismatch),
        }
    }

    fn range_with(&mut self, tag: Eui) {
        self.state = AdvertiserState::RangingInProgress { tag };
        debug!(tag = %tag, "Targeted blink received, ranging");

        match self.exchange(&tag) {
            Ok(distance) => {
                self.stats.exchanges_succeeded += 1;
                debug!(tag = %tag, distance, "Range accept success");
                self.record(tag, distance);
                if self.report_ranges {
                    self.report(tag, distance);
                }
            }
            Err(e) => {
                self.stats.exchanges_failed += 1;
                warn!(tag = %tag, error = %e, "Range accept failed");
            }
        }

        self.listen();
    }

    fn exchange(&mut self, tag: &Eui) -> Result<f64> {
        self.radio.transmit_ranging_initiation(tag, tag.short_address())?;
        self.radio.wait_for_transmission()?;
        let outcome = self.radio.anchor_range_accept()?;
        if outcome.success {
            Ok(outcome.range)
        } else {
            Err(Error::ExchangeTimeout)
        }
    }

    fn record(&mut self, tag: Eui, distance: f64) {
        match self.tags.upsert(tag, TagDistance::measured(distance)) {
            Ok(Upsert::Inserted) => info!(tag = %tag, distance, "New tag ranged"),
            Ok(Upsert::Evicted(old)) => info!(tag = %tag, evicted = %old, distance, "New tag ranged"),
            Ok(Upsert::Updated) => {}
            Err(e) => {
                self.stats.peers_rejected += 1;
                warn!(tag = %tag, error = %e, "Tag table full, distance dropped");
            }
        }
    }

    fn report(&mut self, tag: Eui, distance: f64) {
        let frame = protocol::encode_range_report(&self.eui, protocol::range_to_cm(distance));
        let sent = self
            .radio
            .start_transmit(&frame)
            .and_then(|()| self.radio.wait_for_transmission());
        if let Err(e) = sent {
            warn!(tag = %tag, error = %e, "Failed to send range report");
        }
    }
}

impl<R: RadioDriver, C: Clock> RangingRole for Advertiser<R, C> {
    fn role(&self) -> Role {
        Role::Anchor
    }

    fn eui(&self) -> Eui {
        self.eui
    }

    fn tick(&mut self) {
        Advertiser::tick(self)
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot::Tags(self.tags.snapshot())
    }

    fn stats(&self) -> RoleStats {
        self.stats
    }

    fn set_antenna_delay(&mut self, delay: u16) -> Result<()> {
        self.radio.set_antenna_delay(delay)
    }
}

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::core::{Error, Eui, NodeConfig, Result, Role, ShortAddress};
use crate::peers::{AnchorLink, PeerTable, Upsert};
use crate::protocol::{self, Frame, SequenceCounter};
use crate::radio::RadioDriver;
use crate::util::{Clock, MonotonicClock};
use super::{PeerSnapshot, RangingRole, RoleStats, Scheduler};

/// States of the requester (tag) state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterState {
    /// Constructed, clock not yet armed
    Idle,
    /// Clock armed, receiver not yet enabled for beacons
    AwaitingScanWindow,
    /// Ranging known anchors one after another
    ScanningPeers,
    /// Receiver enabled, collecting beacons until the next scan
    ListeningForBeacons,
}

impl RequesterState {
    pub fn name(&self) -> &'static str {
        match self {
            RequesterState::Idle => "Idle",
            RequesterState::AwaitingScanWindow => "AwaitingScanWindow",
            RequesterState::ScanningPeers => "ScanningPeers",
            RequesterState::ListeningForBeacons => "ListeningForBeacons",
        }
    }
}

/// Tag role: learns anchors from their beacons and ranges against each
/// of them once per scan window
pub struct Requester<R, C = MonotonicClock> {
    radio: R,
    clock: C,
    eui: Eui,
    state: RequesterState,
    scheduler: Scheduler,
    seq: SequenceCounter,
    anchors: PeerTable<AnchorLink>,
    exchange_timeout: Duration,
    stats: RoleStats,
}

impl<R: RadioDriver, C: Clock> Requester<R, C> {
    /// Creates an idle requester around an already configured radio
    pub fn new(radio: R, clock: C, config: &NodeConfig) -> Self {
        let eui = radio.eui();
        Requester {
            radio,
            clock,
            eui,
            state: RequesterState::Idle,
            scheduler: Scheduler::new(config.tag_window, config.rng_seed),
            seq: SequenceCounter::default(),
            anchors: PeerTable::new(config.peer_capacity, config.eviction),
            exchange_timeout: config.exchange_timeout,
            stats: RoleStats::default(),
        }
    }

    pub fn state(&self) -> RequesterState {
        self.state
    }

    /// Anchors heard so far
    pub fn anchors(&self) -> &PeerTable<AnchorLink> {
        &self.anchors
    }

    pub fn known_anchor_count(&self) -> usize {
        self.anchors.len()
    }

    /// Anchor at `index` in discovery order
    pub fn known_anchor(&self, index: usize) -> Option<(Eui, AnchorLink)> {
        self.anchors.entry(index).map(|(eui, link)| (*eui, *link))
    }

    /// Distance last reported by `anchor`, in metres
    pub fn distance_to_anchor(&self, anchor: &Eui) -> Option<f64> {
        self.anchors.get(anchor).and_then(|link| link.reported_distance)
    }

    /// Timestamp of the next scan, once armed
    pub fn next_scan_due(&self) -> Option<u64> {
        self.scheduler.next_due()
    }

    /// Arms the scan clock; called by the first tick if not called earlier
    pub fn start(&mut self) {
        if self.state != RequesterState::Idle {
            return;
        }
        let now = self.clock.now_ms();
        let delay = self.scheduler.arm(now);
        self.state = RequesterState::AwaitingScanWindow;
        info!(eui = %self.eui, delay_ms = delay, "Tag started, first scan scheduled");
    }

    /// Runs one cooperative step: the scan if due, then one inbound poll
    pub fn tick(&mut self) {
        self.start();

        if self.scheduler.is_due(self.clock.now_ms()) {
            self.scan();
        }

        self.listen();
    }

    /// Ranges every known anchor in table order, strictly one at a time
    fn scan(&mut self) {
        self.state = RequesterState::ScanningPeers;
        self.stats.cycles += 1;
        debug!(known = self.anchors.len(), "Scanning known anchors");

        for anchor in self.anchors.identities() {
            let success = match self.range_with(&anchor) {
                Ok(distance) => {
                    self.stats.exchanges_succeeded += 1;
                    trace!(anchor = %anchor, distance, "Exchange complete");
                    true
                }
                Err(e) => {
                    self.stats.exchanges_failed += 1;
                    warn!(anchor = %anchor, error = %e, "Ranging exchange failed");
                    false
                }
            };

            if let Some(link) = self.anchors.get_mut(&anchor) {
                link.reliability.record(success);
                debug!(anchor = %anchor, reliability = link.reliability.value(), success, "Reliability updated");
            }
        }

        let delay = self.scheduler.arm(self.clock.now_ms());
        debug!(delay_ms = delay, "Next ranging session scheduled");
        self.state = RequesterState::AwaitingScanWindow;
    }

    fn range_with(&mut self, anchor: &Eui) -> Result<f64> {
        let blink = protocol::encode_targeted_blink(&self.eui, self.seq.next(), anchor.short_address());
        self.radio.start_transmit(&blink)?;
        self.radio.wait_for_transmission()?;

        let (source, assigned) = self.await_initiation(anchor)?;
        self.radio.set_device_address(assigned)?;

        let outcome = self.radio.tag_range_infrastructure(source, self.exchange_timeout);
        self.restore_address();

        let outcome = outcome?;
        if outcome.success {
            Ok(outcome.range)
        } else {
            Err(Error::ExchangeTimeout)
        }
    }

    /// Reads the anchor's answer to a targeted blink
    fn await_initiation(&mut self, anchor: &Eui) -> Result<(ShortAddress, ShortAddress)> {
        let bytes = self.radio.receive_frame()?.ok_or(Error::ExchangeTimeout)?;
        match protocol::decode(&bytes)? {
            Frame::RangingInitiation {
                destination,
                source,
                assigned,
                ..
            } if destination == self.eui && source == anchor.short_address() => Ok((source, assigned)),
            _ => Err(Error::AddressMismatch),
        }
    }

    fn restore_address(&mut self) {
        if let Err(e) = self.radio.set_device_address(self.eui.short_address()) {
            warn!(error = %e, "Failed to restore device address");
        }
    }

    fn listen(&mut self) {
        if self.state != RequesterState::ListeningForBeacons {
            if let Err(e) = self.radio.start_receive() {
                warn!(error = %e, "Failed to enable receiver");
            }
            self.state = RequesterState::ListeningForBeacons;
        }

        match self.radio.receive_frame() {
            Ok(Some(bytes)) => self.handle_frame(&bytes),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read received frame"),
        }
    }

    fn handle_frame(&mut self, bytes: &[u8]) {
        let result = match protocol::decode(bytes) {
            Ok(Frame::Beacon { eui, .. }) => self.discover(eui),
            Ok(Frame::RangeReport { eui, range_cm }) => self.accept_report(eui, range_cm),
            Ok(_) => Err(Error::AddressMismatch),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            self.stats.frames_dropped += 1;
            trace!(error = %e, len = bytes.len(), "Dropped frame");
        }
    }

    fn discover(&mut self, anchor: Eui) -> Result<()> {
        if self.anchors.contains(&anchor) {
            trace!(anchor = %anchor, "Beacon from known anchor");
            return Ok(());
        }

        match self.anchors.upsert(anchor, AnchorLink::discovered()) {
            Ok(Upsert::Evicted(old)) => info!(anchor = %anchor, evicted = %old, "New anchor discovered"),
            Ok(_) => info!(anchor = %anchor, "New anchor discovered"),
            Err(e) => {
                self.stats.peers_rejected += 1;
                warn!(anchor = %anchor, error = %e, "Anchor table full, beacon ignored");
            }
        }
        Ok(())
    }

    fn accept_report(&mut self, anchor: Eui, range_cm: u16) -> Result<()> {
        let link = self.anchors.get_mut(&anchor).ok_or(Error::AddressMismatch)?;
        let distance = f64::from(range_cm) / 100.0;
        link.reported_distance = Some(distance);
        debug!(anchor = %anchor, distance, "Range report received");
        Ok(())
    }
}

impl<R: RadioDriver, C: Clock> RangingRole for Requester<R, C> {
    fn role(&self) -> Role {
        Role::Tag
    }

    fn eui(&self) -> Eui {
        self.eui
    }

    fn tick(&mut self) {
        Requester::tick(self)
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot::Anchors(self.anchors.snapshot())
    }

    fn stats(&self) -> RoleStats {
        self.stats
    }

    fn set_antenna_delay(&mut self, delay: u16) -> Result<()> {
        self.radio.set_antenna_delay(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{MockRadio, RangeOutcome};
    use crate::util::ManualClock;

    const TAG: Eui = Eui::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    const ANCHOR_A: Eui = Eui::new([0xA1, 0xA2, 0, 0, 0, 0, 0xEF, 0xBE]);
    const ANCHOR_B: Eui = Eui::new([0xB1, 0xB2, 0, 0, 0, 0, 0xEF, 0xBE]);

    fn setup() -> (Requester<MockRadio, ManualClock>, MockRadio, ManualClock) {
        let radio = MockRadio::new(TAG);
        let clock = ManualClock::new(0);
        let mut config = NodeConfig::new(Role::Tag, [0; 6]);
        config.rng_seed = Some(5);
        let tag = Requester::new(radio.clone(), clock.clone(), &config);
        (tag, radio, clock)
    }

    fn hear(tag: &mut Requester<MockRadio, ManualClock>, radio: &MockRadio, anchor: Eui) {
        radio.push_inbound(protocol::encode_beacon_blink(&anchor, 1));
        tag.tick();
    }

    /// Moves the clock to the next scan deadline and runs it
    fn run_scan(tag: &mut Requester<MockRadio, ManualClock>, clock: &ManualClock) {
        clock.set(tag.next_scan_due().unwrap());
        tag.tick();
    }

    fn reliability(tag: &Requester<MockRadio, ManualClock>, anchor: &Eui) -> u8 {
        tag.anchors().get(anchor).unwrap().reliability.value()
    }

    #[test]
    fn test_startup_arms_scan_window() {
        let (mut tag, radio, _clock) = setup();
        assert_eq!(tag.state(), RequesterState::Idle);

        tag.start();
        assert_eq!(tag.state(), RequesterState::AwaitingScanWindow);
        let due = tag.next_scan_due().unwrap();
        assert!((100..=500).contains(&due));

        tag.tick();
        assert_eq!(tag.state(), RequesterState::ListeningForBeacons);
        assert!(radio.is_receiving());
    }

    #[test]
    fn test_beacon_discovers_anchor_once() {
        let (mut tag, radio, _clock) = setup();
        hear(&mut tag, &radio, ANCHOR_A);
        hear(&mut tag, &radio, ANCHOR_B);

        assert_eq!(tag.known_anchor_count(), 2);
        assert_eq!(tag.known_anchor(0).unwrap().0, ANCHOR_A);
        assert_eq!(reliability(&tag, &ANCHOR_A), 100);

        // Lower A's reliability, then hear it again
        tag.anchors.get_mut(&ANCHOR_A).unwrap().reliability.record_failure();
        hear(&mut tag, &radio, ANCHOR_A);

        assert_eq!(tag.known_anchor_count(), 2);
        assert_eq!(tag.known_anchor(0).unwrap().0, ANCHOR_A);
        assert_eq!(reliability(&tag, &ANCHOR_A), 50);
    }

    #[test]
    fn test_scan_updates_each_peer_independently() {
        let (mut tag, radio, clock) = setup();
        hear(&mut tag, &radio, ANCHOR_A);
        hear(&mut tag, &radio, ANCHOR_B);
        radio.clear_transmitted();

        // A answers but the exchange fails; B succeeds
        radio.answer_blinks_from(ANCHOR_A);
        radio.answer_blinks_from(ANCHOR_B);
        radio.push_infrastructure(RangeOutcome::failure());
        radio.push_infrastructure(RangeOutcome::success(4.2));
        tag.anchors.get_mut(&ANCHOR_B).unwrap().reliability = crate::peers::Reliability::new(50);

        run_scan(&mut tag, &clock);

        assert_eq!(reliability(&tag, &ANCHOR_A), 50);
        assert_eq!(reliability(&tag, &ANCHOR_B), 75);
        assert_eq!(tag.stats.exchanges_failed, 1);
        assert_eq!(tag.stats.exchanges_succeeded, 1);

        let blinks: Vec<ShortAddress> = radio
            .transmitted_frames()
            .into_iter()
            .filter_map(|f| match f {
                Frame::TargetedBlink { target, .. } => Some(target),
                _ => None,
            })
            .collect();
        assert_eq!(blinks, vec![ANCHOR_A.short_address(), ANCHOR_B.short_address()]);

        let requests = radio.infrastructure_requests();
        assert_eq!(
            requests,
            vec![
                (ANCHOR_A.short_address(), Duration::from_millis(3000)),
                (ANCHOR_B.short_address(), Duration::from_millis(3000)),
            ]
        );
        assert_eq!(tag.state(), RequesterState::ListeningForBeacons);
    }

    #[test]
    fn test_missing_initiation_counts_as_failure() {
        let (mut tag, radio, clock) = setup();
        hear(&mut tag, &radio, ANCHOR_A);

        run_scan(&mut tag, &clock);
        assert_eq!(reliability(&tag, &ANCHOR_A), 50);
        assert!(radio.infrastructure_requests().is_empty());

        run_scan(&mut tag, &clock);
        assert_eq!(reliability(&tag, &ANCHOR_A), 25);
    }

    #[test]
    fn test_misaddressed_initiation_counts_as_failure() {
        let (mut tag, radio, clock) = setup();
        hear(&mut tag, &radio, ANCHOR_A);

        let other = Eui::new([9, 9, 9, 9, 9, 9, 9, 9]);
        radio.push_inbound(protocol::encode_ranging_initiation(
            1,
            10,
            &other,
            ANCHOR_A.short_address(),
            ShortAddress(0x4242),
        ));
        run_scan(&mut tag, &clock);

        assert_eq!(reliability(&tag, &ANCHOR_A), 50);
        assert!(radio.infrastructure_requests().is_empty());
    }

    #[test]
    fn test_driver_errors_do_not_abort_scan() {
        let (mut tag, radio, clock) = setup();
        hear(&mut tag, &radio, ANCHOR_A);
        hear(&mut tag, &radio, ANCHOR_B);

        radio.answer_blinks_from(ANCHOR_A);
        radio.answer_blinks_from(ANCHOR_B);
        radio.push_infrastructure_error("rx timeout");
        radio.push_infrastructure(RangeOutcome::success(1.0));
        run_scan(&mut tag, &clock);

        assert_eq!(reliability(&tag, &ANCHOR_A), 50);
        assert_eq!(reliability(&tag, &ANCHOR_B), 100);
        assert_eq!(radio.device_address(), Some(TAG.short_address()));
    }

    #[test]
    fn test_adopts_assigned_address_for_exchange() {
        let (mut tag, radio, clock) = setup();
        hear(&mut tag, &radio, ANCHOR_A);

        radio.push_inbound(protocol::encode_ranging_initiation(
            1,
            10,
            &TAG,
            ANCHOR_A.short_address(),
            ShortAddress(0x4242),
        ));
        radio.push_infrastructure(RangeOutcome::success(2.5));
        run_scan(&mut tag, &clock);

        assert_eq!(reliability(&tag, &ANCHOR_A), 100);
        // Address reverts once the exchange is over
        assert_eq!(radio.device_address(), Some(TAG.short_address()));
    }

    #[test]
    fn test_rescans_after_window() {
        let (mut tag, radio, clock) = setup();
        hear(&mut tag, &radio, ANCHOR_A);

        let first = tag.next_scan_due().unwrap();
        run_scan(&mut tag, &clock);
        let second = tag.next_scan_due().unwrap();
        assert!(second >= first + 100 && second <= first + 500);

        clock.set(second - 1);
        tag.tick();
        assert_eq!(tag.stats.cycles, 1);
    }

    #[test]
    fn test_range_report_from_known_anchor() {
        let (mut tag, radio, _clock) = setup();
        hear(&mut tag, &radio, ANCHOR_A);

        radio.push_inbound(protocol::encode_range_report(&ANCHOR_A, 153));
        tag.tick();
        let distance = tag.distance_to_anchor(&ANCHOR_A).unwrap();
        assert!((distance - 1.53).abs() < 1e-9);
        assert_eq!(reliability(&tag, &ANCHOR_A), 100);

        radio.push_inbound(protocol::encode_range_report(&ANCHOR_B, 99));
        tag.tick();
        assert!(tag.distance_to_anchor(&ANCHOR_B).is_none());
        assert_eq!(tag.known_anchor_count(), 1);
        assert_eq!(tag.stats.frames_dropped, 1);
    }

    #[test]
    fn test_full_table_drops_ninth_anchor() {
        let (mut tag, radio, _clock) = setup();
        for n in 0..9u8 {
            hear(&mut tag, &radio, Eui::new([n, 0xAA, 0, 0, 0, 0, 0xEF, 0xBE]));
        }

        assert_eq!(tag.known_anchor_count(), 8);
        assert_eq!(tag.stats.peers_rejected, 1);
        assert!(!tag.anchors().contains(&Eui::new([8, 0xAA, 0, 0, 0, 0, 0xEF, 0xBE])));
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        let (mut tag, radio, _clock) = setup();
        radio.push_inbound(vec![0xC5u8, 0x00, 0x01]);
        radio.push_inbound(protocol::encode_targeted_blink(&ANCHOR_A, 1, TAG.short_address()));
        tag.tick();
        tag.tick();

        assert_eq!(tag.known_anchor_count(), 0);
        assert_eq!(tag.stats.frames_dropped, 2);
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use crate::core::{Error, Eui, Result, ShortAddress, DEFAULT_NETWORK_ID};
use crate::protocol::{self, Frame, SequenceCounter};
use super::{RadioDriver, RangeOutcome};

/// Scripted answer to a ranging primitive
#[derive(Debug, Clone)]
enum Scripted {
    Outcome(RangeOutcome),
    Fail(String),
}

#[derive(Debug)]
struct MockState {
    eui: Eui,
    device_address: Option<ShortAddress>,
    network_id: Option<u16>,
    antenna_delay: Option<u16>,
    receiving: bool,
    receive_starts: usize,
    inbound: VecDeque<Bytes>,
    transmitted: Vec<Bytes>,
    accept_script: VecDeque<Scripted>,
    infrastructure_script: VecDeque<Scripted>,
    initiations: Vec<(Eui, ShortAddress)>,
    infrastructure_requests: Vec<(ShortAddress, Duration)>,
    answering: Vec<Eui>,
    answer_seq: SequenceCounter,
    fail_transmit: bool,
}

/// In-memory radio driven by a script.
///
/// Clones share state, so a test can hand one clone to a role and keep
/// another to queue inbound frames and inspect what was sent. Unscripted
/// ranging primitives time out.
#[derive(Debug, Clone)]
pub struct MockRadio {
    state: Arc<Mutex<MockState>>,
}

impl MockRadio {
    pub fn new(eui: Eui) -> Self {
        MockRadio {
            state: Arc::new(Mutex::new(MockState {
                eui,
                device_address: None,
                network_id: None,
                antenna_delay: None,
                receiving: false,
                receive_starts: 0,
                inbound: VecDeque::new(),
                transmitted: Vec::new(),
                accept_script: VecDeque::new(),
                infrastructure_script: VecDeque::new(),
                initiations: Vec::new(),
                infrastructure_requests: Vec::new(),
                answering: Vec::new(),
                answer_seq: SequenceCounter::default(),
                fail_transmit: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues a payload for `receive_frame`
    pub fn push_inbound(&self, frame: impl Into<Bytes>) {
        self.lock().inbound.push_back(frame.into());
    }

    /// Queues the next `anchor_range_accept` result
    pub fn push_accept(&self, outcome: RangeOutcome) {
        self.lock().accept_script.push_back(Scripted::Outcome(outcome));
    }

    /// Queues a driver error for the next `anchor_range_accept`
    pub fn push_accept_error(&self, msg: impl Into<String>) {
        self.lock().accept_script.push_back(Scripted::Fail(msg.into()));
    }

    /// Queues the next `tag_range_infrastructure` result
    pub fn push_infrastructure(&self, outcome: RangeOutcome) {
        self.lock().infrastructure_script.push_back(Scripted::Outcome(outcome));
    }

    /// Queues a driver error for the next `tag_range_infrastructure`
    pub fn push_infrastructure_error(&self, msg: impl Into<String>) {
        self.lock().infrastructure_script.push_back(Scripted::Fail(msg.into()));
    }

    /// Makes the radio answer targeted blinks addressed to `anchor` with a
    /// ranging initiation from that anchor
    pub fn answer_blinks_from(&self, anchor: Eui) {
        self.lock().answering.push(anchor);
    }

    /// Makes every subsequent transmission fail
    pub fn fail_transmissions(&self, fail: bool) {
        self.lock().fail_transmit = fail;
    }

    /// Everything transmitted so far, in order
    pub fn transmitted(&self) -> Vec<Bytes> {
        self.lock().transmitted.clone()
    }

    /// Transmitted payloads that decode cleanly
    pub fn transmitted_frames(&self) -> Vec<Frame> {
        self.lock()
            .transmitted
            .iter()
            .filter_map(|bytes| protocol::decode(bytes).ok())
            .collect()
    }

    pub fn clear_transmitted(&self) {
        self.lock().transmitted.clear();
    }

    /// Tags this radio has sent a ranging initiation to
    pub fn initiations(&self) -> Vec<(Eui, ShortAddress)> {
        self.lock().initiations.clone()
    }

    /// Anchors and timeouts passed to `tag_range_infrastructure`
    pub fn infrastructure_requests(&self) -> Vec<(ShortAddress, Duration)> {
        self.lock().infrastructure_requests.clone()
    }

    pub fn antenna_delay(&self) -> Option<u16> {
        self.lock().antenna_delay
    }

    pub fn device_address(&self) -> Option<ShortAddress> {
        self.lock().device_address
    }

    pub fn network_id(&self) -> Option<u16> {
        self.lock().network_id
    }

    pub fn is_receiving(&self) -> bool {
        self.lock().receiving
    }

    pub fn receive_starts(&self) -> usize {
        self.lock().receive_starts
    }

    pub fn pending_inbound(&self) -> usize {
        self.lock().inbound.len()
    }
}

impl MockState {
    fn answer(&mut self, frame: &[u8]) {
        let Ok(Frame::TargetedBlink { eui: tag, target, .. }) = protocol::decode(frame) else {
            return;
        };
        let Some(anchor) = self.answering.iter().find(|a| a.short_address() == target).copied() else {
            return;
        };
        let seq = self.answer_seq.next();
        let init = protocol::encode_ranging_initiation(
            seq,
            self.network_id.unwrap_or(DEFAULT_NETWORK_ID),
            &tag,
            anchor.short_address(),
            tag.short_address(),
        );
        self.inbound.push_front(init);
    }
}

fn play(script: Option<Scripted>) -> Result<RangeOutcome> {
    match script {
        Some(Scripted::Outcome(outcome)) => Ok(outcome),
        Some(Scripted::Fail(msg)) => Err(Error::radio(msg)),
        None => Err(Error::ExchangeTimeout),
    }
}

impl RadioDriver for MockRadio {
    fn eui(&self) -> Eui {
        self.lock().eui
    }

    fn set_eui(&mut self, eui: Eui) -> Result<()> {
        self.lock().eui = eui;
        Ok(())
    }

    fn set_device_address(&mut self, address: ShortAddress) -> Result<()> {
        self.lock().device_address = Some(address);
        Ok(())
    }

    fn set_network_id(&mut self, network_id: u16) -> Result<()> {
        self.lock().network_id = Some(network_id);
        Ok(())
    }

    fn set_antenna_delay(&mut self, delay: u16) -> Result<()> {
        self.lock().antenna_delay = Some(delay);
        Ok(())
    }

    fn start_transmit(&mut self, frame: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if state.fail_transmit {
            return Err(Error::radio("transmit failed"));
        }
        state.receiving = false;
        state.transmitted.push(Bytes::copy_from_slice(frame));
        state.answer(frame);
        Ok(())
    }

    fn wait_for_transmission(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_receive(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.receiving = true;
        state.receive_starts += 1;
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<Bytes>> {
        Ok(self.lock().inbound.pop_front())
    }

    fn transmit_ranging_initiation(&mut self, tag: &Eui, tag_address: ShortAddress) -> Result<()> {
        let mut state = self.lock();
        if state.fail_transmit {
            return Err(Error::radio("transmit failed"));
        }
        let seq = state.answer_seq.next();
        let own = state.eui.short_address();
        let pan = state.network_id.unwrap_or(DEFAULT_NETWORK_ID);
        let frame = protocol::encode_ranging_initiation(seq, pan, tag, own, tag_address);
        state.transmitted.push(frame);
        state.initiations.push((*tag, tag_address));
        Ok(())
    }

    fn anchor_range_accept(&mut self) -> Result<RangeOutcome> {
        let next = self.lock().accept_script.pop_front();
        play(next)
    }

    fn tag_range_infrastructure(&mut self, anchor: ShortAddress, timeout: Duration) -> Result<RangeOutcome> {
        let mut state = self.lock();
        state.infrastructure_requests.push((anchor, timeout));
        let next = state.infrastructure_script.pop_front();
        drop(state);
        play(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eui(n: u8) -> Eui {
        Eui::new([n, n, 0, 0, 0, 0, 0xEF, 0xBE])
    }

    #[test]
    fn test_clones_share_state() {
        let handle = MockRadio::new(eui(1));
        let mut radio = handle.clone();

        handle.push_inbound(vec![1u8, 2, 3]);
        assert_eq!(radio.receive_frame().unwrap().as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(radio.receive_frame().unwrap(), None);

        radio.start_transmit(&[9]).unwrap();
        assert_eq!(handle.transmitted(), vec![Bytes::from_static(&[9])]);
    }

    #[test]
    fn test_unscripted_ranging_times_out() {
        let mut radio = MockRadio::new(eui(1));
        assert!(matches!(radio.anchor_range_accept(), Err(Error::ExchangeTimeout)));

        radio.push_accept(RangeOutcome::success(1.5));
        radio.push_accept_error("rx overrun");
        assert_eq!(radio.anchor_range_accept().unwrap(), RangeOutcome::success(1.5));
        assert!(matches!(radio.anchor_range_accept(), Err(Error::Radio(_))));
    }

    #[test]
    fn test_answers_targeted_blinks() {
        let anchor = eui(7);
        let tag = eui(2);
        let mut radio = MockRadio::new(tag);
        radio.answer_blinks_from(anchor);

        let blink = protocol::encode_targeted_blink(&tag, 1, anchor.short_address());
        radio.start_transmit(&blink).unwrap();

        let reply = radio.receive_frame().unwrap().unwrap();
        match protocol::decode(&reply).unwrap() {
            Frame::RangingInitiation { destination, source, assigned, .. } => {
                assert_eq!(destination, tag);
                assert_eq!(source, anchor.short_address());
                assert_eq!(assigned, tag.short_address());
            }
            other => panic!("Expected ranging initiation, got {:?}", other),
        }

        // Blinks for anchors that are not answering get no reply
        let blink = protocol::encode_targeted_blink(&tag, 2, eui(9).short_address());
        radio.start_transmit(&blink).unwrap();
        assert_eq!(radio.receive_frame().unwrap(), None);
    }
}

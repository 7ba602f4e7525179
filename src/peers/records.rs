use serde::{Deserialize, Serialize};

use super::PeerPayload;

/// Upper bound of the reliability score
pub const MAX_RELIABILITY: u8 = 100;

/// Smoothed confidence that ranging against an anchor succeeds.
///
/// Each outcome moves the score halfway toward 100 (success) or 0 (failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reliability(u8);

impl Reliability {
    /// Score given to a freshly discovered anchor
    pub const fn initial() -> Self {
        Reliability(MAX_RELIABILITY)
    }

    /// Creates a score, clamped to 100
    pub fn new(value: u8) -> Self {
        Reliability(value.min(MAX_RELIABILITY))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Moves the score halfway toward 100
    pub fn record_success(&mut self) {
        let raised = (u16::from(self.0) + u16::from(MAX_RELIABILITY)) / 2;
        self.0 = raised.min(u16::from(MAX_RELIABILITY)) as u8;
    }

    /// Moves the score halfway toward 0
    pub fn record_failure(&mut self) {
        self.0 /= 2;
    }

    /// Applies one exchange outcome
    pub fn record(&mut self, success: bool) {
        if success {
            self.record_success();
        } else {
            self.record_failure();
        }
    }
}

impl Default for Reliability {
    fn default() -> Self {
        Reliability::initial()
    }
}

/// An anchor's view of a tag it has ranged with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagDistance {
    /// Last measured distance in metres
    pub distance: f64,
    /// Whether `distance` came from a completed exchange
    pub valid: bool,
}

impl TagDistance {
    /// Record for a completed exchange
    pub fn measured(distance: f64) -> Self {
        TagDistance {
            distance,
            valid: true,
        }
    }
}

impl PeerPayload for TagDistance {
    fn confidence(&self) -> u8 {
        if self.valid {
            MAX_RELIABILITY
        } else {
            0
        }
    }
}

/// A tag's view of an anchor it has heard
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorLink {
    /// Ranging success score
    pub reliability: Reliability,
    /// Distance the anchor last reported back, in metres
    pub reported_distance: Option<f64>,
}

impl AnchorLink {
    /// Record for a newly heard beacon
    pub fn discovered() -> Self {
        AnchorLink::default()
    }
}

impl PeerPayload for AnchorLink {
    fn confidence(&self) -> u8 {
        self.reliability.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_moves_halfway_up() {
        let mut r = Reliability::new(50);
        r.record_success();
        assert_eq!(r.value(), 75);
        r.record_success();
        assert_eq!(r.value(), 87);

        let mut full = Reliability::initial();
        full.record_success();
        assert_eq!(full.value(), 100);
    }

    #[test]
    fn test_failure_moves_halfway_down() {
        let mut r = Reliability::initial();
        r.record_failure();
        assert_eq!(r.value(), 50);
        r.record_failure();
        assert_eq!(r.value(), 25);

        let mut zero = Reliability::new(0);
        zero.record_failure();
        assert_eq!(zero.value(), 0);
    }

    #[test]
    fn test_reliability_stays_in_bounds() {
        // Deterministic outcome stream derived from a simple LCG
        let mut state: u32 = 0x1234_5678;
        for start in [0u8, 1, 37, 99, 100] {
            let mut r = Reliability::new(start);
            for _ in 0..500 {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let success = (state >> 16) & 1 == 1;
                let before = u16::from(r.value());
                r.record(success);
                let expected = if success {
                    ((before + 100) / 2).min(100)
                } else {
                    before / 2
                };
                assert_eq!(u16::from(r.value()), expected);
                assert!(r.value() <= MAX_RELIABILITY);
            }
        }
    }

    #[test]
    fn test_new_clamps() {
        assert_eq!(Reliability::new(250).value(), 100);
    }

    #[test]
    fn test_confidence() {
        assert_eq!(TagDistance::measured(1.0).confidence(), 100);
        assert_eq!(
            TagDistance {
                distance: 0.0,
                valid: false
            }
            .confidence(),
            0
        );
        assert_eq!(AnchorLink::discovered().confidence(), 100);
    }
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::JitterWindow;

/// Single "next action due" timestamp, re-armed with random jitter.
///
/// Delays are drawn uniformly from the inclusive jitter window (ALOHA-style
/// random access).
#[derive(Debug)]
pub struct Scheduler {
    min_ms: u64,
    max_ms: u64,
    next_due_ms: Option<u64>,
    rng: StdRng,
}

impl Scheduler {
    /// Creates an unarmed scheduler; a seed makes the jitter reproducible
    pub fn new(window: JitterWindow, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let min_ms = millis(window.min);
        let max_ms = millis(window.max).max(min_ms);
        Scheduler {
            min_ms,
            max_ms,
            next_due_ms: None,
            rng,
        }
    }

    /// Arms the clock a random delay after `now_ms` and returns the delay
    pub fn arm(&mut self, now_ms: u64) -> u64 {
        let delay = self.rng.gen_range(self.min_ms..=self.max_ms);
        self.next_due_ms = Some(now_ms.saturating_add(delay));
        delay
    }

    /// Whether the armed deadline has been reached
    pub fn is_due(&self, now_ms: u64) -> bool {
        matches!(self.next_due_ms, Some(due) if now_ms >= due)
    }

    pub fn next_due(&self) -> Option<u64> {
        self.next_due_ms
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

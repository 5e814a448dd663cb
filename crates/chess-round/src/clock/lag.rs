//! Round-trip latency estimate fed by heartbeat samples.

use std::collections::VecDeque;
use std::time::Duration;

/// Moving average over the most recent round-trip samples.
#[derive(Debug, Clone)]
pub struct LagTracker {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LagTracker {
    pub const DEFAULT_SAMPLES: usize = 8;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        LagTracker {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, round_trip: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(round_trip);
    }

    /// Average of the retained samples, zero before the first one.
    pub fn estimate(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total = self
            .samples
            .iter()
            .fold(Duration::ZERO, |sum, sample| sum.saturating_add(*sample));
        total / self.samples.len() as u32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for LagTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SAMPLES)
    }
}

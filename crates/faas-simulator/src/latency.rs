use crate::config::LatencyRange;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of simulated request latencies.
///
/// Implementations must return a value inside `range`.
pub trait LatencySource: Send {
    fn sample(&mut self, range: LatencyRange) -> f64;
}

/// Uniform draws from a seedable RNG.
#[derive(Debug, Clone)]
pub struct RandomLatency {
    rng: StdRng,
}

impl RandomLatency {
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl LatencySource for RandomLatency {
    fn sample(&mut self, range: LatencyRange) -> f64 {
        if range.min_ms >= range.max_ms {
            return range.min_ms;
        }
        self.rng.random_range(range.min_ms..=range.max_ms)
    }
}

/// Replays a fixed list of latencies, clamped into the requested range.
/// Once exhausted it keeps answering with the range minimum.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLatency {
    samples: VecDeque<f64>,
}

impl ScriptedLatency {
    pub fn new(samples: impl IntoIterator<Item = f64>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl LatencySource for ScriptedLatency {
    fn sample(&mut self, range: LatencyRange) -> f64 {
        match self.samples.pop_front() {
            Some(ms) => range.clamp(ms),
            None => range.min_ms,
        }
    }
}

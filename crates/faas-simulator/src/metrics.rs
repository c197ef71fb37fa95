use crate::registry::ContainerRegistry;
use faas_common::{ContainerState, MetricsSnapshot};

/// Lifetime request counters and every latency recorded since the last reset.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RequestLedger {
    total_requests: u64,
    cold_starts: u64,
    latencies_ms: Vec<f64>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, latency_ms: f64, cold_start: bool) {
        self.total_requests += 1;
        if cold_start {
            self.cold_starts += 1;
        }
        self.latencies_ms.push(latency_ms);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn cold_starts(&self) -> u64 {
        self.cold_starts
    }

    pub fn latencies_ms(&self) -> &[f64] {
        &self.latencies_ms
    }

    /// Mean latency rounded to the nearest millisecond, 0 with no history.
    pub fn average_latency_ms(&self) -> u64 {
        if self.latencies_ms.is_empty() {
            return 0;
        }
        let sum: f64 = self.latencies_ms.iter().sum();
        (sum / self.latencies_ms.len() as f64).round() as u64
    }
}

pub fn aggregate(registry: &ContainerRegistry, ledger: &RequestLedger) -> MetricsSnapshot {
    let idle_containers = registry
        .iter()
        .filter(|c| c.state == ContainerState::Idle)
        .count();
    let total_containers = registry.len();

    MetricsSnapshot {
        active_containers: total_containers - idle_containers,
        idle_containers,
        total_containers,
        total_requests: ledger.total_requests(),
        cold_starts: ledger.cold_starts(),
        warm_starts: ledger.total_requests() - ledger.cold_starts(),
        average_latency_ms: ledger.average_latency_ms(),
    }
}

use crate::registry::ContainerRegistry;
use faas_common::{ContainerId, ContainerState, SimTime};
use std::time::Duration;

/// Periodic sweep that marks long-unused warm containers as idle.
///
/// The reaper only decides *which* containers are dormant; the engine applies
/// the transitions so that every state change goes through one place.
#[derive(Debug, Clone)]
pub struct IdleReaper {
    period: Duration,
    dormancy_threshold: Duration,
    running: bool,
}

impl IdleReaper {
    /// A zero period is raised to 1 ms so a running reaper always lets time pass.
    pub fn new(period: Duration, dormancy_threshold: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            dormancy_threshold,
            running: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn dormancy_threshold(&self) -> Duration {
        self.dormancy_threshold
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Returns `false` if the reaper was already running.
    pub(crate) fn start(&mut self) -> bool {
        !std::mem::replace(&mut self.running, true)
    }

    /// Warm containers whose last use is more than the dormancy threshold ago.
    pub fn dormant_containers(&self, registry: &ContainerRegistry, now: SimTime) -> Vec<ContainerId> {
        registry
            .iter()
            .filter(|c| c.state == ContainerState::Warm)
            .filter(|c| now.saturating_duration_since(c.last_used_at) > self.dormancy_threshold)
            .map(|c| c.id)
            .collect()
    }
}

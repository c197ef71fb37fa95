// Shared vocabulary for the lifecycle simulator and its presentation layers

use std::fmt::{self, Display};
use std::time::Duration;

pub use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaasError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid Latency Range: [{min}, {max}] ms")]
    InvalidRange { min: f64, max: f64 },

    #[error("Simulator driver has stopped")]
    DriverStopped,

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Define the primary Result type for simulator operations
pub type Result<T> = std::result::Result<T, FaasError>;

/// Point on the simulated timeline, measured from the moment the simulator was built.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(Duration);

impl SimTime {
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    pub const fn from_duration(elapsed: Duration) -> Self {
        Self(elapsed)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_millis_f64(&self) -> f64 {
        self.0.as_secs_f64() * 1000.0
    }

    pub fn saturating_add(self, delay: Duration) -> Self {
        Self(self.0.saturating_add(delay))
    }

    /// Elapsed time since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_duration_since(&self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:.3}s", self.0.as_secs_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(u64);

impl ContainerId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lambda-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Cold,
    Executing,
    Warm,
    Idle,
}

impl ContainerState {
    /// Warm and idle containers can both take a new request.
    pub fn is_reusable(&self) -> bool {
        matches!(self, ContainerState::Warm | ContainerState::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Cold => "cold",
            ContainerState::Executing => "executing",
            ContainerState::Warm => "warm",
            ContainerState::Idle => "idle",
        }
    }
}

impl Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub state: ContainerState,
    pub created_at: SimTime,
    /// Last time the container entered `Executing`; creation time until then.
    pub last_used_at: SimTime,
    pub execution_count: u64,
}

/// A container state change as seen by presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub container_id: ContainerId,
    /// `None` when the container was just created.
    pub from: Option<ContainerState>,
    pub to: ContainerState,
    pub request_id: Option<String>,
    pub timestamp: SimTime,
}

impl Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = self.from.map(|s| s.as_str()).unwrap_or("new");
        write!(f, "[{}] {}: {} -> {}", self.timestamp, self.container_id, from, self.to)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " ({request_id})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Containers in any state other than `Idle`.
    pub active_containers: usize,
    pub idle_containers: usize,
    pub total_containers: usize,
    pub total_requests: u64,
    pub cold_starts: u64,
    pub warm_starts: u64,
    pub average_latency_ms: u64,
}

impl Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active={} idle={} requests={} cold_starts={} avg_latency={}ms",
            self.active_containers,
            self.idle_containers,
            self.total_requests,
            self.cold_starts,
            self.average_latency_ms
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Cold,
    Warm,
    Concurrent,
    #[default]
    #[serde(rename = "")]
    Neutral,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Cold => "cold",
            LogCategory::Warm => "warm",
            LogCategory::Concurrent => "concurrent",
            LogCategory::Neutral => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: SimTime,
    pub text: String,
    pub category: LogCategory,
}

impl Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at, self.text)
    }
}

/// Consumer of everything the lifecycle engine publishes.
///
/// Callbacks run synchronously on the engine's thread of control, so
/// implementations should hand heavy work off rather than block.
pub trait PresentationSink: Send + Sync {
    fn on_lifecycle_event(&self, event: &LifecycleEvent);

    fn on_metrics_updated(&self, snapshot: &MetricsSnapshot);

    fn on_log_message(&self, entry: &LogEntry);

    /// Everything rendered so far is stale.
    fn on_reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization() {
        let event = LifecycleEvent {
            container_id: ContainerId::new(3),
            from: Some(ContainerState::Executing),
            to: ContainerState::Warm,
            request_id: Some("REQ-1".to_string()),
            timestamp: SimTime::from_millis(1500),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"container_id\":3"));
        assert!(json.contains("\"from\":\"executing\""));
        assert!(json.contains("\"to\":\"warm\""));

        let entry = LogEntry {
            at: SimTime::ZERO,
            text: "Simulator initialized".to_string(),
            category: LogCategory::Neutral,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"category\":\"\""));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(ContainerId::new(7).to_string(), "lambda-7");
        assert_eq!(SimTime::from_millis(1234).to_string(), "+1.234s");

        let created = LifecycleEvent {
            container_id: ContainerId::new(1),
            from: None,
            to: ContainerState::Cold,
            request_id: None,
            timestamp: SimTime::ZERO,
        };
        assert_eq!(created.to_string(), "[+0.000s] lambda-1: new -> cold");
    }

    #[test]
    fn test_reusable_states() {
        assert!(ContainerState::Warm.is_reusable());
        assert!(ContainerState::Idle.is_reusable());
        assert!(!ContainerState::Cold.is_reusable());
        assert!(!ContainerState::Executing.is_reusable());
    }

    #[test]
    fn test_sim_time_arithmetic() {
        let t = SimTime::from_millis(1000);
        let later = t.saturating_add(Duration::from_millis(250));
        assert_eq!(later.saturating_duration_since(t), Duration::from_millis(250));
        assert_eq!(t.saturating_duration_since(later), Duration::ZERO);
        assert_eq!(later.as_millis_f64(), 1250.0);
    }
}

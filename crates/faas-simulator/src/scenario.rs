use crate::engine::Simulator;
use faas_common::{FaasError, LogCategory};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const CONCURRENT_REQUESTS: u64 = 5;
const CONCURRENT_SPACING: Duration = Duration::from_millis(100);
const HIGH_LOAD_REQUESTS: u64 = 20;
const HIGH_LOAD_SPACING: Duration = Duration::from_millis(500);
const PROVISION_READY_AFTER: Duration = Duration::from_millis(1000);

/// Canned request patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// One request, whatever the registry holds.
    ColdStart,
    /// One request against a warm container, provisioning one first if needed.
    WarmStart,
    /// Five requests, 100 ms apart.
    Concurrent,
    /// Twenty requests, 500 ms apart.
    HighLoad,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::ColdStart,
        Scenario::WarmStart,
        Scenario::Concurrent,
        Scenario::HighLoad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::ColdStart => "cold",
            Scenario::WarmStart => "warm",
            Scenario::Concurrent => "concurrent",
            Scenario::HighLoad => "high-load",
        }
    }

    /// Issue or schedule the scenario's requests. Nothing beyond the first
    /// dispatch happens until the simulator is advanced.
    pub fn run(self, sim: &mut Simulator) {
        let stamp = sim.now().as_duration().as_millis();
        info!(scenario = self.as_str(), "running scenario");
        match self {
            Scenario::ColdStart => {
                sim.log("Simulating cold start scenario...", LogCategory::Cold);
                sim.dispatch(format!("REQ-{stamp}"));
            }
            Scenario::WarmStart => {
                if sim.containers().is_empty() {
                    sim.log(
                        "No warm containers available. Creating one first...",
                        LogCategory::Warm,
                    );
                    sim.provision(PROVISION_READY_AFTER);
                    let ready_stamp = stamp + PROVISION_READY_AFTER.as_millis();
                    sim.schedule_dispatch(PROVISION_READY_AFTER, format!("REQ-{ready_stamp}"));
                    return;
                }
                sim.log("Simulating warm start scenario...", LogCategory::Warm);
                sim.dispatch(format!("REQ-{stamp}"));
            }
            Scenario::Concurrent => {
                sim.log(
                    format!("Simulating {CONCURRENT_REQUESTS} concurrent requests..."),
                    LogCategory::Concurrent,
                );
                spread(sim, "CONCURRENT", CONCURRENT_REQUESTS, CONCURRENT_SPACING);
            }
            Scenario::HighLoad => {
                sim.log(
                    format!(
                        "Simulating high load ({} requests over {} seconds)...",
                        HIGH_LOAD_REQUESTS,
                        (HIGH_LOAD_SPACING * HIGH_LOAD_REQUESTS as u32).as_secs()
                    ),
                    LogCategory::Concurrent,
                );
                spread(sim, "LOAD", HIGH_LOAD_REQUESTS, HIGH_LOAD_SPACING);
            }
        }
    }
}

fn spread(sim: &mut Simulator, prefix: &str, count: u64, spacing: Duration) {
    let base = sim.now().as_duration();
    for i in 0..count {
        let delay = spacing * i as u32;
        let stamp = (base + delay).as_millis();
        sim.schedule_dispatch(delay, format!("{prefix}-{stamp}-{i}"));
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = FaasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cold" | "cold-start" => Ok(Scenario::ColdStart),
            "warm" | "warm-start" => Ok(Scenario::WarmStart),
            "concurrent" => Ok(Scenario::Concurrent),
            "load" | "high-load" => Ok(Scenario::HighLoad),
            other => Err(FaasError::Config(format!("unknown scenario: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::latency::ScriptedLatency;
    use crate::sink::RecordingSink;
    use faas_common::ContainerState;
    use std::sync::Arc;

    fn simulator() -> Simulator {
        Simulator::with_latency_source(
            SimulatorConfig::default(),
            Arc::new(RecordingSink::new()),
            Box::new(ScriptedLatency::default()),
        )
    }

    #[test]
    fn test_parse_names() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.as_str().parse::<Scenario>().unwrap(), scenario);
        }
        assert_eq!("Cold-Start".parse::<Scenario>().unwrap(), Scenario::ColdStart);
        assert!("burst".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_warm_start_provisions_then_reuses() {
        let mut sim = simulator();
        Scenario::WarmStart.run(&mut sim);
        assert_eq!(sim.metrics().total_requests, 0);

        sim.advance(Duration::from_millis(1000));
        let metrics = sim.metrics();
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.cold_starts, 0);
        assert_eq!(sim.containers().len(), 1);
        assert_eq!(sim.containers()[0].state, ContainerState::Executing);

        sim.advance(Duration::from_millis(100));
        assert_eq!(sim.containers()[0].state, ContainerState::Warm);
        assert_eq!(sim.containers()[0].execution_count, 1);
    }

    #[test]
    fn test_high_load_spreads_requests() {
        let mut sim = simulator();
        Scenario::HighLoad.run(&mut sim);
        assert_eq!(sim.pending(), 20);

        sim.advance(Duration::from_millis(9500));
        assert_eq!(sim.metrics().total_requests, 20);
    }

    #[test]
    fn test_cold_start_request_id() {
        let mut sim = simulator();
        sim.advance(Duration::from_millis(42));
        Scenario::ColdStart.run(&mut sim);

        let texts: Vec<String> = sim.log_entries().into_iter().map(|e| e.text).collect();
        assert_eq!(texts[0], "Simulating cold start scenario...");
        sim.advance(Duration::from_secs(1));
        let texts: Vec<String> = sim.log_entries().into_iter().map(|e| e.text).collect();
        assert!(texts.contains(&"Request REQ-42 completed in 500ms".to_string()));
    }
}

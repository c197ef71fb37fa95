use faas_common::FaasError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("latency range [{min_ms}, {max_ms}] ms is empty or negative")]
    InvalidRange { min_ms: f64, max_ms: f64 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl From<ConfigError> for FaasError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidRange { min_ms, max_ms } => FaasError::InvalidRange {
                min: min_ms,
                max: max_ms,
            },
            other => FaasError::Config(other.to_string()),
        }
    }
}

/// Closed interval of simulated latencies, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyRange {
    pub min_ms: f64,
    pub max_ms: f64,
}

impl LatencyRange {
    pub fn new(min_ms: f64, max_ms: f64) -> Result<Self, ConfigError> {
        let range = Self { min_ms, max_ms };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = self.min_ms.is_finite() && self.max_ms.is_finite();
        if !finite || self.min_ms < 0.0 || self.min_ms > self.max_ms {
            return Err(ConfigError::InvalidRange {
                min_ms: self.min_ms,
                max_ms: self.max_ms,
            });
        }
        Ok(())
    }

    pub fn contains(&self, ms: f64) -> bool {
        ms >= self.min_ms && ms <= self.max_ms
    }

    pub fn clamp(&self, ms: f64) -> f64 {
        ms.clamp(self.min_ms, self.max_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Latency drawn for requests that have to create a container.
    pub cold_latency: LatencyRange,
    /// Latency drawn for requests served by a warm or idle container.
    pub warm_latency: LatencyRange,
    /// How long before completion a cold container starts executing.
    pub execution_lead_ms: u64,
    /// Upper bound on how long a warm container shows as executing.
    pub warm_completion_cap_ms: u64,
    pub reaper_period_ms: u64,
    /// Warm containers unused for longer than this are demoted to idle.
    pub dormancy_threshold_ms: u64,
    pub log_capacity: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            cold_latency: LatencyRange {
                min_ms: 500.0,
                max_ms: 2500.0,
            },
            warm_latency: LatencyRange {
                min_ms: 10.0,
                max_ms: 60.0,
            },
            execution_lead_ms: 1000,
            warm_completion_cap_ms: 100,
            reaper_period_ms: 2000,
            dormancy_threshold_ms: 10_000,
            log_capacity: 50,
        }
    }
}

impl SimulatorConfig {
    /// Defaults overridden by any `FAAS_SIM_*` variables present in the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SimulatorConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        override_with(&lookup, "FAAS_SIM_COLD_MIN_MS", &mut config.cold_latency.min_ms)?;
        override_with(&lookup, "FAAS_SIM_COLD_MAX_MS", &mut config.cold_latency.max_ms)?;
        override_with(&lookup, "FAAS_SIM_WARM_MIN_MS", &mut config.warm_latency.min_ms)?;
        override_with(&lookup, "FAAS_SIM_WARM_MAX_MS", &mut config.warm_latency.max_ms)?;
        override_with(&lookup, "FAAS_SIM_EXECUTION_LEAD_MS", &mut config.execution_lead_ms)?;
        override_with(
            &lookup,
            "FAAS_SIM_WARM_COMPLETION_CAP_MS",
            &mut config.warm_completion_cap_ms,
        )?;
        override_with(&lookup, "FAAS_SIM_REAPER_PERIOD_MS", &mut config.reaper_period_ms)?;
        override_with(
            &lookup,
            "FAAS_SIM_DORMANCY_THRESHOLD_MS",
            &mut config.dormancy_threshold_ms,
        )?;
        override_with(&lookup, "FAAS_SIM_LOG_CAPACITY", &mut config.log_capacity)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cold_latency.validate()?;
        self.warm_latency.validate()?;
        if self.reaper_period_ms == 0 {
            return Err(ConfigError::Zero("reaper_period_ms"));
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::Zero("log_capacity"));
        }
        Ok(())
    }

    /// Replace any latency range that fails validation with its default.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if let Err(e) = self.cold_latency.validate() {
            warn!("{}; using the default cold latency range", e);
            self.cold_latency = defaults.cold_latency;
        }
        if let Err(e) = self.warm_latency.validate() {
            warn!("{}; using the default warm latency range", e);
            self.warm_latency = defaults.warm_latency;
        }
        self
    }

    pub fn execution_lead(&self) -> Duration {
        Duration::from_millis(self.execution_lead_ms)
    }

    pub fn warm_completion_cap(&self) -> Duration {
        Duration::from_millis(self.warm_completion_cap_ms)
    }

    pub fn reaper_period(&self) -> Duration {
        Duration::from_millis(self.reaper_period_ms)
    }

    pub fn dormancy_threshold(&self) -> Duration {
        Duration::from_millis(self.dormancy_threshold_ms)
    }
}

fn override_with<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value: raw.clone() })?;
    debug!("config override {}={}", key, raw.trim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_platform_constants() {
        let config = SimulatorConfig::default();
        assert_eq!(config.cold_latency, LatencyRange::new(500.0, 2500.0).unwrap());
        assert_eq!(config.warm_latency, LatencyRange::new(10.0, 60.0).unwrap());
        assert_eq!(config.execution_lead(), Duration::from_secs(1));
        assert_eq!(config.warm_completion_cap(), Duration::from_millis(100));
        assert_eq!(config.reaper_period(), Duration::from_secs(2));
        assert_eq!(config.dormancy_threshold(), Duration::from_secs(10));
        assert_eq!(config.log_capacity, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = SimulatorConfig::from_lookup(lookup_from(&[
            ("FAAS_SIM_COLD_MIN_MS", "800"),
            ("FAAS_SIM_DORMANCY_THRESHOLD_MS", " 3000 "),
            ("FAAS_SIM_LOG_CAPACITY", "10"),
        ]))
        .unwrap();

        assert_eq!(config.cold_latency.min_ms, 800.0);
        assert_eq!(config.cold_latency.max_ms, 2500.0);
        assert_eq!(config.dormancy_threshold_ms, 3000);
        assert_eq!(config.log_capacity, 10);
    }

    #[test]
    fn test_rejects_unparseable_value() {
        let err = SimulatorConfig::from_lookup(lookup_from(&[("FAAS_SIM_REAPER_PERIOD_MS", "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "FAAS_SIM_REAPER_PERIOD_MS",
                value: "soon".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_inverted_range_and_zero_period() {
        let err = SimulatorConfig::from_lookup(lookup_from(&[
            ("FAAS_SIM_WARM_MIN_MS", "90"),
            ("FAAS_SIM_WARM_MAX_MS", "20"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRange { .. }));

        let err = SimulatorConfig::from_lookup(lookup_from(&[("FAAS_SIM_REAPER_PERIOD_MS", "0")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Zero("reaper_period_ms"));

        let faas: FaasError = err.into();
        assert!(faas.to_string().contains("reaper_period_ms"));
    }

    #[test]
    fn test_sanitized_keeps_valid_ranges() {
        let mut config = SimulatorConfig::default();
        config.cold_latency = LatencyRange {
            min_ms: 100.0,
            max_ms: 200.0,
        };
        config.warm_latency = LatencyRange {
            min_ms: -5.0,
            max_ms: 20.0,
        };

        let config = config.sanitized();
        assert_eq!(config.cold_latency, LatencyRange::new(100.0, 200.0).unwrap());
        assert_eq!(config.warm_latency, SimulatorConfig::default().warm_latency);
    }

    #[test]
    fn test_range_clamp() {
        let range = LatencyRange::new(10.0, 60.0).unwrap();
        assert_eq!(range.clamp(5.0), 10.0);
        assert_eq!(range.clamp(75.0), 60.0);
        assert!(range.contains(35.5));
        assert!(LatencyRange::new(f64::NAN, 1.0).is_err());
    }
}

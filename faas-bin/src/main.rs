use clap::{ArgAction, Parser};
use color_eyre::eyre;
use faas_common::{LogCategory, PresentationSink};
use faas_simulator::{
    ConfigError, JsonLinesSink, RandomLatency, Scenario, Simulator, SimulatorConfig,
    SimulatorHandle, SinkRecord, TracingSink,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod repl;

/// Upper bound for `--gap-ms` and `--duration-ms` (one week).
const MAX_RUN_MS: u64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Parser, Debug)]
#[command(
    name = "faas-sim",
    version,
    about = "Simulate serverless cold starts, warm starts and container idling"
)]
struct Cli {
    /// Scenario to run (cold, warm, concurrent, high-load); repeat to chain several
    #[arg(short, long = "scenario", value_name = "NAME")]
    scenarios: Vec<Scenario>,

    /// Time between consecutive scenarios
    #[arg(
        long,
        default_value_t = 3000,
        value_name = "MS",
        value_parser = clap::value_parser!(u64).range(..=MAX_RUN_MS)
    )]
    gap_ms: u64,

    /// Time to keep running after the last scenario
    #[arg(
        long,
        default_value_t = 15_000,
        value_name = "MS",
        value_parser = clap::value_parser!(u64).range(..=MAX_RUN_MS)
    )]
    duration_ms: u64,

    /// Seed for latency sampling
    #[arg(long, env = "FAAS_SIM_SEED")]
    seed: Option<u64>,

    /// Emit every event as a JSON line instead of tracing output
    #[arg(long)]
    json: bool,

    /// Run the scenarios against the wall clock instead of instant virtual time
    #[arg(long)]
    realtime: bool,

    /// Read commands from stdin and run against the wall clock
    #[arg(short, long, conflicts_with = "realtime")]
    interactive: bool,

    /// Run the idle reaper
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    reaper: bool,

    /// Overrides FAAS_SIM_COLD_MIN_MS
    #[arg(long, value_name = "MS")]
    cold_min_ms: Option<f64>,

    /// Overrides FAAS_SIM_COLD_MAX_MS
    #[arg(long, value_name = "MS")]
    cold_max_ms: Option<f64>,

    /// Overrides FAAS_SIM_WARM_MIN_MS
    #[arg(long, value_name = "MS")]
    warm_min_ms: Option<f64>,

    /// Overrides FAAS_SIM_WARM_MAX_MS
    #[arg(long, value_name = "MS")]
    warm_max_ms: Option<f64>,

    /// Overrides FAAS_SIM_REAPER_PERIOD_MS
    #[arg(long, value_name = "MS")]
    reaper_period_ms: Option<u64>,

    /// Overrides FAAS_SIM_DORMANCY_THRESHOLD_MS
    #[arg(long, value_name = "MS")]
    dormancy_threshold_ms: Option<u64>,
}

impl Cli {
    /// Apply flag overrides on top of the environment config and re-validate.
    fn configure(&self, mut config: SimulatorConfig) -> Result<SimulatorConfig, ConfigError> {
        if let Some(ms) = self.cold_min_ms {
            config.cold_latency.min_ms = ms;
        }
        if let Some(ms) = self.cold_max_ms {
            config.cold_latency.max_ms = ms;
        }
        if let Some(ms) = self.warm_min_ms {
            config.warm_latency.min_ms = ms;
        }
        if let Some(ms) = self.warm_max_ms {
            config.warm_latency.max_ms = ms;
        }
        if let Some(ms) = self.reaper_period_ms {
            config.reaper_period_ms = ms;
        }
        if let Some(ms) = self.dormancy_threshold_ms {
            config.dormancy_threshold_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }

    fn scenarios(&self) -> Vec<Scenario> {
        if self.scenarios.is_empty() {
            vec![Scenario::ColdStart, Scenario::WarmStart, Scenario::Concurrent]
        } else {
            self.scenarios.clone()
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.configure(SimulatorConfig::from_env()?)?;
    info!("Starting FaaS lifecycle simulator...");

    let sink: Arc<dyn PresentationSink> = if cli.json {
        Arc::new(JsonLinesSink::new(std::io::stdout()))
    } else {
        Arc::new(TracingSink)
    };
    let latency = match cli.seed {
        Some(seed) => RandomLatency::seeded(seed),
        None => RandomLatency::from_os_rng(),
    };

    let mut sim = Simulator::with_latency_source(config, sink, Box::new(latency));
    sim.log(
        "Simulator initialized. Dispatch requests to watch containers start, warm up and go idle.",
        LogCategory::Neutral,
    );
    if cli.reaper {
        sim.start_idle_reaper();
    }

    let sim = if cli.interactive {
        let handle = SimulatorHandle::spawn(sim);
        repl::run(&handle).await?;
        handle.shutdown().await?
    } else if cli.realtime {
        run_realtime(&cli, sim).await?
    } else {
        for scenario in cli.scenarios() {
            scenario.run(&mut sim);
            sim.advance(Duration::from_millis(cli.gap_ms));
        }
        sim.advance(Duration::from_millis(cli.duration_ms));
        sim
    };

    print_summary(&sim, cli.json)?;
    Ok(())
}

/// Play the scenarios on the tokio driver, sleeping through the gaps.
async fn run_realtime(cli: &Cli, sim: Simulator) -> eyre::Result<Simulator> {
    let handle = SimulatorHandle::spawn(sim);
    let run = async {
        for scenario in cli.scenarios() {
            handle.run_scenario(scenario).await;
            tokio::time::sleep(Duration::from_millis(cli.gap_ms)).await;
        }
        tokio::time::sleep(Duration::from_millis(cli.duration_ms)).await;
    };
    tokio::select! {
        _ = run => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }
    Ok(handle.shutdown().await?)
}

fn print_summary(sim: &Simulator, json: bool) -> eyre::Result<()> {
    let metrics = sim.metrics();
    if json {
        println!("{}", serde_json::to_string(&SinkRecord::Metrics(metrics))?);
        return Ok(());
    }

    println!("--- execution log ---");
    for entry in sim.log_entries() {
        println!("{entry}");
    }
    println!("--- containers at {} ---", sim.now());
    for container in sim.containers() {
        println!(
            "{:<10} {:<10} executions={}",
            container.id.to_string(),
            container.state.as_str(),
            container.execution_count
        );
    }
    println!("--- metrics ---");
    println!("{metrics}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_realtime_and_reaper_flags() {
        let cli = Cli::try_parse_from(["faas-sim", "--realtime", "--reaper", "false"]).unwrap();
        assert!(cli.realtime);
        assert!(!cli.reaper);

        let cli = Cli::try_parse_from(["faas-sim"]).unwrap();
        assert!(!cli.realtime);
        assert!(cli.reaper);
        assert_eq!(
            cli.scenarios(),
            vec![Scenario::ColdStart, Scenario::WarmStart, Scenario::Concurrent]
        );

        assert!(Cli::try_parse_from(["faas-sim", "--realtime", "--interactive"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "faas-sim",
            "--cold-min-ms",
            "800",
            "--warm-max-ms",
            "40",
            "--dormancy-threshold-ms",
            "3000",
            "--scenario",
            "high-load",
        ])
        .unwrap();
        let config = cli.configure(SimulatorConfig::default()).unwrap();

        assert_eq!(config.cold_latency.min_ms, 800.0);
        assert_eq!(config.cold_latency.max_ms, 2500.0);
        assert_eq!(config.warm_latency.max_ms, 40.0);
        assert_eq!(config.dormancy_threshold_ms, 3000);
        assert_eq!(cli.scenarios(), vec![Scenario::HighLoad]);

        let cli = Cli::try_parse_from(["faas-sim", "--warm-min-ms", "90"]).unwrap();
        assert!(matches!(
            cli.configure(SimulatorConfig::default()),
            Err(ConfigError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_run_length_is_bounded() {
        let too_long = (MAX_RUN_MS + 1).to_string();
        assert!(Cli::try_parse_from(["faas-sim", "--duration-ms", too_long.as_str()]).is_err());
        assert!(Cli::try_parse_from(["faas-sim", "--gap-ms", too_long.as_str()]).is_err());

        let max = MAX_RUN_MS.to_string();
        let cli = Cli::try_parse_from(["faas-sim", "--duration-ms", max.as_str()]).unwrap();
        assert_eq!(cli.duration_ms, MAX_RUN_MS);
    }
}

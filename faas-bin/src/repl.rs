use color_eyre::eyre;
use faas_simulator::{Scenario, SimulatorHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "commands: cold | warm | concurrent | high-load | dispatch [id] | reset | metrics | containers | log | help | quit";

/// Read commands from stdin until EOF, `quit` or ctrl-c.
pub async fn run(handle: &SimulatorHandle) -> eyre::Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        };
        let Some(line) = line else { break };

        let mut words = line.split_whitespace();
        let Some(command) = words.next() else { continue };
        match command {
            "quit" | "exit" => break,
            "help" => println!("{HELP}"),
            "dispatch" => {
                let request_id = words
                    .next()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("REQ-{}", uuid::Uuid::new_v4()));
                let latency = handle.dispatch(request_id.clone()).await;
                println!("{request_id}: {}ms", latency.round() as u64);
            }
            "reset" => handle.reset().await,
            "metrics" => println!("{}", handle.metrics().await),
            "containers" => {
                for container in handle.containers().await {
                    println!(
                        "{:<10} {:<10} executions={}",
                        container.id.to_string(),
                        container.state.as_str(),
                        container.execution_count
                    );
                }
            }
            "log" => {
                for entry in handle.log_entries().await {
                    println!("{entry}");
                }
            }
            other => match other.parse::<Scenario>() {
                Ok(scenario) => handle.run_scenario(scenario).await,
                Err(e) => {
                    warn!("{}", e);
                    println!("{HELP}");
                }
            },
        }
    }
    Ok(())
}

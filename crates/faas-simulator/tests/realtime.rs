//! Driver tests. Tokio's paused clock stands in for wall-clock time.

use anyhow::Result;
use faas_common::ContainerState;
use faas_simulator::{
    RecordingSink, Scenario, ScriptedLatency, Simulator, SimulatorConfig, SimulatorHandle,
};
use std::sync::Arc;
use std::time::Duration;

fn handle_with(latencies: impl IntoIterator<Item = f64>) -> (SimulatorHandle, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let sim = Simulator::with_latency_source(
        SimulatorConfig::default(),
        sink.clone(),
        Box::new(ScriptedLatency::new(latencies)),
    );
    (SimulatorHandle::spawn(sim), sink)
}

#[tokio::test(start_paused = true)]
async fn test_reaper_runs_in_background() -> Result<()> {
    let (handle, sink) = handle_with([1000.0]);
    assert!(handle.start_idle_reaper().await);
    assert!(!handle.start_idle_reaper().await);

    handle.dispatch("REQ-1".to_string()).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(handle.metrics().await.active_containers, 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    let containers = handle.containers().await;
    assert_eq!(containers[0].state, ContainerState::Idle);
    assert_eq!(handle.metrics().await.active_containers, 0);
    assert!(sink
        .lifecycle_events()
        .iter()
        .any(|e| e.to == ContainerState::Idle));

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_scenario_in_real_time() -> Result<()> {
    let (handle, _sink) = handle_with([2000.0; 5]);
    handle.run_scenario(Scenario::Concurrent).await;

    tokio::time::sleep(Duration::from_millis(450)).await;
    let metrics = handle.metrics().await;
    assert_eq!(metrics.total_requests, 5);
    assert_eq!(metrics.cold_starts, 5);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(handle
        .containers()
        .await
        .iter()
        .all(|c| c.state == ContainerState::Warm && c.execution_count == 1));

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reset_while_requests_in_flight() -> Result<()> {
    let (handle, _sink) = handle_with([2000.0, 1800.0]);
    handle.dispatch("OLD".to_string()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    handle.reset().await;
    handle.dispatch("NEW".to_string()).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    let containers = handle.containers().await;
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].execution_count, 1);
    assert_eq!(handle.metrics().await.total_requests, 1);

    let log = handle.log_entries().await;
    assert_eq!(log[0].text, "Simulation reset. Ready for new executions...");
    assert!(log.iter().all(|e| !e.text.contains("OLD")));

    let sim = handle.shutdown().await?;
    assert_eq!(sim.pending(), 0);
    Ok(())
}

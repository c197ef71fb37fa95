//! Wall-clock driver for a [`Simulator`].
//!
//! The simulator itself only knows virtual time. [`SimulatorHandle`] owns it
//! behind a mutex and runs a background task that sleeps until the next
//! scheduled action is due, so scheduled transitions happen in real time.
//! Every access through the handle first catches the simulator up to the
//! current wall-clock instant.

use crate::engine::Simulator;
use crate::scenario::Scenario;
use faas_common::{Container, FaasError, LogEntry, MetricsSnapshot, Result, SimTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

struct Shared {
    sim: Mutex<Simulator>,
    wake: Notify,
    started: Instant,
    base: SimTime,
}

impl Shared {
    fn elapsed(&self) -> SimTime {
        self.base.saturating_add(self.started.elapsed())
    }

    fn deadline(&self, at: SimTime) -> Instant {
        self.started + at.saturating_duration_since(self.base)
    }
}

pub struct SimulatorHandle {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    driver: JoinHandle<()>,
}

impl SimulatorHandle {
    /// Move `sim` onto a background driver task. Must be called inside a tokio runtime.
    pub fn spawn(sim: Simulator) -> Self {
        let base = sim.now();
        let shared = Arc::new(Shared {
            sim: Mutex::new(sim),
            wake: Notify::new(),
            started: Instant::now(),
            base,
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let driver = tokio::spawn(drive(shared.clone(), shutdown_rx));
        info!("Simulator driver started");

        Self {
            shared,
            shutdown,
            driver,
        }
    }

    /// Run `f` against the simulator, caught up to the current instant.
    pub async fn with<R>(&self, f: impl FnOnce(&mut Simulator) -> R) -> R {
        let result = {
            let mut sim = self.shared.sim.lock().await;
            sim.advance_to(self.shared.elapsed());
            f(&mut sim)
        };
        // f may have scheduled something earlier than the driver's current deadline
        self.shared.wake.notify_one();
        result
    }

    #[instrument(skip(self))]
    pub async fn dispatch(&self, request_id: String) -> f64 {
        self.with(|sim| sim.dispatch(request_id)).await
    }

    pub async fn schedule_dispatch(&self, delay: Duration, request_id: String) -> SimTime {
        self.with(|sim| sim.schedule_dispatch(delay, request_id)).await
    }

    #[instrument(skip(self))]
    pub async fn run_scenario(&self, scenario: Scenario) {
        self.with(|sim| scenario.run(sim)).await
    }

    #[instrument(skip(self))]
    pub async fn reset(&self) {
        self.with(Simulator::reset).await
    }

    pub async fn start_idle_reaper(&self) -> bool {
        self.with(Simulator::start_idle_reaper).await
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.with(|sim| sim.metrics()).await
    }

    pub async fn containers(&self) -> Vec<Container> {
        self.with(|sim| sim.containers()).await
    }

    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.with(|sim| sim.log_entries()).await
    }

    /// Stop the driver and hand the simulator back.
    pub async fn shutdown(self) -> Result<Simulator> {
        let _ = self.shutdown.send(true);
        self.driver
            .await
            .map_err(|e| FaasError::Internal(format!("simulator driver panicked: {e}")))?;

        let shared = Arc::try_unwrap(self.shared).map_err(|_| FaasError::DriverStopped)?;
        let mut sim = shared.sim.into_inner();
        sim.advance_to(shared.base.saturating_add(shared.started.elapsed()));
        info!("Simulator driver stopped");
        Ok(sim)
    }
}

async fn drive(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let next = {
            let mut sim = shared.sim.lock().await;
            let fired = sim.advance_to(shared.elapsed());
            if fired > 0 {
                debug!(fired, now = %sim.now(), "driver advanced simulator");
            }
            sim.next_fire_at()
        };

        let sleep = async {
            match next {
                Some(at) => tokio::time::sleep_until(shared.deadline(at)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = sleep => {}
            _ = shared.wake.notified() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

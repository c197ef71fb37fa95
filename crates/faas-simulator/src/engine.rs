//! Lifecycle engine: routes requests to containers and drives their state
//! changes over simulated time.

use crate::config::SimulatorConfig;
use crate::latency::{LatencySource, RandomLatency};
use crate::log::ExecutionLog;
use crate::metrics::{self, RequestLedger};
use crate::reaper::IdleReaper;
use crate::registry::ContainerRegistry;
use crate::scheduler::Scheduler;
use faas_common::{
    Container, ContainerId, ContainerState, LifecycleEvent, LogCategory, LogEntry,
    MetricsSnapshot, PresentationSink, SimTime,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
enum Action {
    Transition(Transition),
    Dispatch { request_id: String },
    ReaperTick,
}

/// A state change scheduled against one container of one registry generation.
#[derive(Debug)]
struct Transition {
    generation: u64,
    container: ContainerId,
    expect: ContainerState,
    to: ContainerState,
    request_id: Option<String>,
    completion: Option<Completion>,
}

/// Attached to the transition that finishes a request.
#[derive(Debug, Clone, Copy)]
struct Completion {
    latency_ms: f64,
    category: LogCategory,
}

pub struct Simulator {
    config: SimulatorConfig,
    scheduler: Scheduler<Action>,
    registry: ContainerRegistry,
    ledger: RequestLedger,
    log: ExecutionLog,
    reaper: IdleReaper,
    latency: Box<dyn LatencySource>,
    sink: Arc<dyn PresentationSink>,
}

impl Simulator {
    /// Simulator drawing latencies from OS-seeded randomness.
    pub fn new(config: SimulatorConfig, sink: Arc<dyn PresentationSink>) -> Self {
        Self::with_latency_source(config, sink, Box::new(RandomLatency::from_os_rng()))
    }

    /// Latency ranges that fail validation are replaced with the defaults.
    pub fn with_latency_source(
        config: SimulatorConfig,
        sink: Arc<dyn PresentationSink>,
        latency: Box<dyn LatencySource>,
    ) -> Self {
        let config = config.sanitized();
        let reaper = IdleReaper::new(config.reaper_period(), config.dormancy_threshold());
        let log = ExecutionLog::new(config.log_capacity);
        Self {
            config,
            scheduler: Scheduler::new(),
            registry: ContainerRegistry::new(),
            ledger: RequestLedger::new(),
            log,
            reaper,
            latency,
            sink,
        }
    }

    /// Serve a request, returning its simulated latency in milliseconds.
    ///
    /// The latency is decided here and never revised. All state changes
    /// beyond the first are scheduled; call [`Simulator::advance`] to let
    /// them happen.
    pub fn dispatch(&mut self, request_id: impl Into<String>) -> f64 {
        let request_id = request_id.into();
        let warm = self
            .registry
            .find_reusable()
            .and_then(|id| self.start_warm(id, &request_id));
        let (latency_ms, cold_start) = match warm {
            Some(latency_ms) => (latency_ms, false),
            None => (self.start_cold(&request_id), true),
        };

        self.ledger.record(latency_ms, cold_start);
        debug!(
            request_id = %request_id,
            latency_ms,
            cold_start,
            "request dispatched"
        );
        self.publish_metrics();
        latency_ms
    }

    /// Dispatch `request_id` once `delay` of simulated time has passed.
    pub fn schedule_dispatch(&mut self, delay: Duration, request_id: impl Into<String>) -> SimTime {
        self.scheduler.schedule(
            delay,
            Action::Dispatch {
                request_id: request_id.into(),
            },
        )
    }

    /// Create a container ahead of any request; it becomes warm after `ready_after`.
    ///
    /// Provisioning is neither a request nor a cold start in the metrics.
    pub fn provision(&mut self, ready_after: Duration) -> ContainerId {
        let now = self.scheduler.now();
        let container = self.registry.create(now);
        self.emit(container.id, None, ContainerState::Cold, None);
        self.log(
            format!("Provisioning new container {}", container.id),
            LogCategory::Cold,
        );

        let transition = Transition {
            generation: self.registry.generation(),
            container: container.id,
            expect: ContainerState::Cold,
            to: ContainerState::Warm,
            request_id: None,
            completion: None,
        };
        self.scheduler
            .schedule(ready_after, Action::Transition(transition));
        self.publish_metrics();
        container.id
    }

    /// Begin the periodic idle sweep. Returns `false` if it was already running.
    pub fn start_idle_reaper(&mut self) -> bool {
        if !self.reaper.start() {
            return false;
        }
        self.scheduler
            .schedule(self.reaper.period(), Action::ReaperTick);
        info!(
            "Idle reaper started (period {:?}, dormancy threshold {:?})",
            self.reaper.period(),
            self.reaper.dormancy_threshold()
        );
        true
    }

    pub fn idle_reaper_running(&self) -> bool {
        self.reaper.is_running()
    }

    /// One reaper pass at the current time. Returns how many containers went idle.
    pub fn sweep_idle(&mut self) -> usize {
        let now = self.scheduler.now();
        let dormant = self.reaper.dormant_containers(&self.registry, now);
        for id in &dormant {
            if let Some(container) = self.registry.get_mut(*id) {
                container.state = ContainerState::Idle;
            }
            self.emit(*id, Some(ContainerState::Warm), ContainerState::Idle, None);
            self.log(format!("Container {id} went idle"), LogCategory::Warm);
            self.publish_metrics();
        }
        dormant.len()
    }

    /// Drop every container, counter and latency, and start a fresh log.
    ///
    /// Scheduled transitions are left in the queue; they find their
    /// container gone and do nothing when they fire.
    pub fn reset(&mut self) {
        let dropped = self.registry.clear();
        self.ledger.clear();
        self.log.clear();
        self.sink.on_reset();
        info!(
            "Simulation reset ({} containers dropped, {} actions still pending)",
            dropped,
            self.scheduler.pending()
        );
        self.log(
            "Simulation reset. Ready for new executions...",
            LogCategory::Neutral,
        );
        self.publish_metrics();
    }

    /// Append to the execution log and notify the sink.
    pub fn log(&mut self, text: impl Into<String>, category: LogCategory) {
        let entry = LogEntry {
            at: self.scheduler.now(),
            text: text.into(),
            category,
        };
        self.sink.on_log_message(&entry);
        self.log.push(entry);
    }

    /// Run everything due within the next `by` of simulated time.
    /// Returns the number of scheduled actions that fired.
    ///
    /// With the idle reaper running this fires one tick per reaper period,
    /// so huge values of `by` take proportionally long.
    pub fn advance(&mut self, by: Duration) -> usize {
        let target = self.scheduler.now().saturating_add(by);
        self.advance_to(target)
    }

    /// Run everything due at or before `target`, then move the clock to it.
    pub fn advance_to(&mut self, target: SimTime) -> usize {
        let mut fired = 0;
        while let Some((_, action)) = self.scheduler.pop_due(target) {
            self.run(action);
            fired += 1;
        }
        self.scheduler.advance_clock(target);
        fired
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn next_fire_at(&self) -> Option<SimTime> {
        self.scheduler.next_fire_at()
    }

    pub fn pending(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        metrics::aggregate(&self.registry, &self.ledger)
    }

    pub fn containers(&self) -> Vec<Container> {
        self.registry.all()
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.registry.get(id)
    }

    pub fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.log.to_vec()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn start_cold(&mut self, request_id: &str) -> f64 {
        let now = self.scheduler.now();
        let container = self.registry.create(now);
        let id = container.id;
        self.emit(id, None, ContainerState::Cold, Some(request_id));
        self.log(
            format!("Cold start: Creating new container {id}"),
            LogCategory::Cold,
        );

        let latency_ms = self.latency.sample(self.config.cold_latency);
        let completes_after = from_ms(latency_ms);
        let generation = self.registry.generation();

        self.scheduler.schedule(
            completes_after.saturating_sub(self.config.execution_lead()),
            Action::Transition(Transition {
                generation,
                container: id,
                expect: ContainerState::Cold,
                to: ContainerState::Executing,
                request_id: Some(request_id.to_string()),
                completion: None,
            }),
        );
        self.scheduler.schedule(
            completes_after,
            Action::Transition(Transition {
                generation,
                container: id,
                expect: ContainerState::Executing,
                to: ContainerState::Warm,
                request_id: Some(request_id.to_string()),
                completion: Some(Completion {
                    latency_ms,
                    category: LogCategory::Cold,
                }),
            }),
        );
        latency_ms
    }

    fn start_warm(&mut self, id: ContainerId, request_id: &str) -> Option<f64> {
        let now = self.scheduler.now();
        let container = self.registry.get_mut(id)?;
        let from = container.state;
        container.state = ContainerState::Executing;
        container.last_used_at = container.last_used_at.max(now);
        let latency_ms = self.latency.sample(self.config.warm_latency);

        self.emit(id, Some(from), ContainerState::Executing, Some(request_id));
        self.log(format!("Reusing warm container {id}"), LogCategory::Warm);

        let completes_after = from_ms(latency_ms).min(self.config.warm_completion_cap());
        self.scheduler.schedule(
            completes_after,
            Action::Transition(Transition {
                generation: self.registry.generation(),
                container: id,
                expect: ContainerState::Executing,
                to: ContainerState::Warm,
                request_id: Some(request_id.to_string()),
                completion: Some(Completion {
                    latency_ms,
                    category: LogCategory::Warm,
                }),
            }),
        );
        Some(latency_ms)
    }

    fn run(&mut self, action: Action) {
        match action {
            Action::Transition(transition) => self.apply(transition),
            Action::Dispatch { request_id } => {
                self.dispatch(request_id);
            }
            Action::ReaperTick => {
                self.sweep_idle();
                self.publish_metrics();
                let now = self.scheduler.now();
                let next = now.saturating_add(self.reaper.period());
                if next > now {
                    self.scheduler.schedule_at(next, Action::ReaperTick);
                } else {
                    debug!("idle reaper stopped at the end of simulated time");
                }
            }
        }
    }

    fn apply(&mut self, transition: Transition) {
        let now = self.scheduler.now();
        let Some(container) = self
            .registry
            .get_mut_in(transition.generation, transition.container)
        else {
            debug!(
                container = %transition.container,
                generation = transition.generation,
                "dropping transition for a container that no longer exists"
            );
            return;
        };
        if container.state != transition.expect {
            debug!(
                container = %transition.container,
                state = %container.state,
                expected = %transition.expect,
                "dropping out-of-order transition"
            );
            return;
        }

        let from = container.state;
        container.state = transition.to;
        if transition.to == ContainerState::Executing {
            container.last_used_at = container.last_used_at.max(now);
        }
        if transition.completion.is_some() {
            container.execution_count += 1;
        }

        let id = transition.container;
        self.emit(id, Some(from), transition.to, transition.request_id.as_deref());
        if let Some(completion) = transition.completion {
            let request_id = transition.request_id.as_deref().unwrap_or("-");
            self.log(
                format!(
                    "Request {} completed in {}ms",
                    request_id,
                    completion.latency_ms.round() as u64
                ),
                completion.category,
            );
        }
        self.publish_metrics();
    }

    fn emit(
        &self,
        container_id: ContainerId,
        from: Option<ContainerState>,
        to: ContainerState,
        request_id: Option<&str>,
    ) {
        let event = LifecycleEvent {
            container_id,
            from,
            to,
            request_id: request_id.map(str::to_string),
            timestamp: self.scheduler.now(),
        };
        self.sink.on_lifecycle_event(&event);
    }

    fn publish_metrics(&self) {
        self.sink.on_metrics_updated(&self.metrics());
    }
}

/// Milliseconds as a delay, rounded to the nanosecond; negative values become zero.
fn from_ms(ms: f64) -> Duration {
    Duration::from_nanos((ms.max(0.0) * 1_000_000.0).round() as u64)
}

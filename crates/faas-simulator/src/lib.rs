//! Discrete-event simulation of serverless container lifecycles.
//!
//! A [`Simulator`] routes each request to a warm container when one is
//! available and creates a new (cold) container otherwise. All state changes
//! happen through a virtual-time [`scheduler::Scheduler`], so the engine can
//! be driven instantly in tests or against the wall clock through
//! [`runtime::SimulatorHandle`].

// Re-export dependencies potentially needed by consumers (like the CLI)
pub use faas_common as common;

pub mod config;
pub mod engine;
pub mod latency;
pub mod log;
pub mod metrics;
pub mod reaper;
pub mod registry;
pub mod runtime;
pub mod scenario;
pub mod scheduler;
pub mod sink;

pub use config::{ConfigError, LatencyRange, SimulatorConfig};
pub use engine::Simulator;
pub use latency::{LatencySource, RandomLatency, ScriptedLatency};
pub use metrics::RequestLedger;
pub use registry::ContainerRegistry;
pub use runtime::SimulatorHandle;
pub use scenario::Scenario;
pub use sink::{FanoutSink, JsonLinesSink, NullSink, RecordingSink, SinkRecord, TracingSink};

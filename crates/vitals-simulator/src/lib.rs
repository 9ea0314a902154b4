//! Periodic vital-sign simulation: generate a noisy reading, publish it for
//! the query API, score it, and raise an alarm when it looks anomalous.

pub mod metrics;
pub mod orchestrator;
pub mod variance;

pub use metrics::TickMetrics;
pub use orchestrator::{Orchestrator, TickOutcome};

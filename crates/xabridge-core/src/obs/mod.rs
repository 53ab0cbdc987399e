//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! Transaction code never touches counters directly; every event flows
//! through a `MetricsSink` owned by the driver.

pub(crate) mod metrics;
pub(crate) mod sink;

#[cfg(test)]
mod tests;

// re-exports
pub use metrics::{EventReport, MetricsRecorder};
pub use sink::{MetricsEvent, MetricsSink, NoopMetricsSink, TerminalKind};

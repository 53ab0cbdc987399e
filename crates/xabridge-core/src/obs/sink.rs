//! Metrics sink boundary.
//!
//! All instrumentation flows through `MetricsEvent` and `MetricsSink`.

use std::fmt;

///
/// TerminalKind
///
/// The terminal command that ended a worker session.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TerminalKind {
    Commit,
    Rollback,
    Prepare,
    CommitPrepared,
    RollbackPrepared,
}

impl TerminalKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Prepare => "prepare",
            Self::CommitPrepared => "commit_prepared",
            Self::RollbackPrepared => "rollback_prepared",
        }
    }
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    SessionStart,

    /// One backend closure invocation past the worker gate.
    CommitAttempt { kind: TerminalKind },

    /// `records` counts mutations applied, staged, replayed or discarded.
    TerminalFinish { kind: TerminalKind, records: u64 },

    TransactionFailed { kind: TerminalKind },
    ValidationRejected,
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent);
}

///
/// NoopMetricsSink
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _: MetricsEvent) {}
}

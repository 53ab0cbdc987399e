use crate::{
    obs::sink::{MetricsEvent, MetricsSink, TerminalKind},
    types::Timestamp,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

///
/// EventReport
/// Point-in-time counters aggregated by a `MetricsRecorder`.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventReport {
    pub sessions_started: u64,

    // Backend closure invocations
    pub commit_attempts: u64,

    // Local transactions
    pub commits: u64,
    pub mutations_committed: u64,
    pub rollbacks: u64,

    // Two-phase
    pub prepares: u64,
    pub records_staged: u64,
    pub prepared_commits: u64,
    pub records_replayed: u64,
    pub prepared_rollbacks: u64,
    pub records_discarded: u64,

    // Failures
    pub transaction_failures: u64,
    pub validation_rejections: u64,

    pub since_ms: u64,
}

impl EventReport {
    fn fresh() -> Self {
        Self {
            since_ms: Timestamp::now().as_micros() / 1_000,
            ..Self::default()
        }
    }
}

///
/// MetricsRecorder
/// Default sink: in-memory saturating counters.
///

#[derive(Debug)]
pub struct MetricsRecorder {
    state: Mutex<EventReport>,
}

impl MetricsRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EventReport::fresh()),
        }
    }

    #[must_use]
    pub fn report(&self) -> EventReport {
        self.state.lock().clone()
    }

    /// Reset all counters and restart the window.
    pub fn reset(&self) {
        *self.state.lock() = EventReport::fresh();
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsRecorder {
    fn record(&self, event: MetricsEvent) {
        let mut m = self.state.lock();
        match event {
            MetricsEvent::SessionStart => {
                m.sessions_started = m.sessions_started.saturating_add(1);
            }

            MetricsEvent::CommitAttempt { .. } => {
                m.commit_attempts = m.commit_attempts.saturating_add(1);
            }

            MetricsEvent::TerminalFinish { kind, records } => match kind {
                TerminalKind::Commit => {
                    m.commits = m.commits.saturating_add(1);
                    m.mutations_committed = m.mutations_committed.saturating_add(records);
                }
                TerminalKind::Rollback => m.rollbacks = m.rollbacks.saturating_add(1),
                TerminalKind::Prepare => {
                    m.prepares = m.prepares.saturating_add(1);
                    m.records_staged = m.records_staged.saturating_add(records);
                }
                TerminalKind::CommitPrepared => {
                    m.prepared_commits = m.prepared_commits.saturating_add(1);
                    m.records_replayed = m.records_replayed.saturating_add(records);
                }
                TerminalKind::RollbackPrepared => {
                    m.prepared_rollbacks = m.prepared_rollbacks.saturating_add(1);
                    m.records_discarded = m.records_discarded.saturating_add(records);
                }
            },

            MetricsEvent::TransactionFailed { .. } => {
                m.transaction_failures = m.transaction_failures.saturating_add(1);
            }

            MetricsEvent::ValidationRejected => {
                m.validation_rejections = m.validation_rejections.saturating_add(1);
            }
        }
    }
}

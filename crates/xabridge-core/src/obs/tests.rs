use super::*;

#[test]
fn recorder_aggregates_terminal_events() {
    let recorder = MetricsRecorder::new();

    recorder.record(MetricsEvent::SessionStart);
    recorder.record(MetricsEvent::CommitAttempt {
        kind: TerminalKind::Commit,
    });
    recorder.record(MetricsEvent::CommitAttempt {
        kind: TerminalKind::Commit,
    });
    recorder.record(MetricsEvent::TerminalFinish {
        kind: TerminalKind::Commit,
        records: 3,
    });
    recorder.record(MetricsEvent::TerminalFinish {
        kind: TerminalKind::Prepare,
        records: 2,
    });
    recorder.record(MetricsEvent::TerminalFinish {
        kind: TerminalKind::RollbackPrepared,
        records: 2,
    });
    recorder.record(MetricsEvent::ValidationRejected);

    let report = recorder.report();
    assert_eq!(report.sessions_started, 1);
    assert_eq!(report.commit_attempts, 2);
    assert_eq!(report.commits, 1);
    assert_eq!(report.mutations_committed, 3);
    assert_eq!(report.prepares, 1);
    assert_eq!(report.records_staged, 2);
    assert_eq!(report.prepared_rollbacks, 1);
    assert_eq!(report.records_discarded, 2);
    assert_eq!(report.validation_rejections, 1);
    assert_eq!(report.prepared_commits, 0);
}

#[test]
fn reset_clears_counters() {
    let recorder = MetricsRecorder::new();
    recorder.record(MetricsEvent::TransactionFailed {
        kind: TerminalKind::Commit,
    });
    recorder.reset();

    let report = recorder.report();
    assert_eq!(report.transaction_failures, 0);
    assert_eq!(
        report,
        EventReport {
            since_ms: report.since_ms,
            ..EventReport::default()
        }
    );
}

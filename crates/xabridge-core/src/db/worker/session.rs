use crate::{
    db::{
        backend::{Catalog, ReadWriteContext, WorkOutcome},
        mutation::{Key, KeySet, Mutation, MutationKind},
        worker::{Command, Shared, Snapshot, WorkerContext, WorkerStatus},
    },
    error::InternalError,
    obs::{MetricsEvent, TerminalKind},
    types::Timestamp,
};
use log::{debug, info};
use std::{collections::BTreeMap, sync::Arc, thread};

/// Body of the session thread.
pub(super) fn run(shared: &Shared, ctx: &WorkerContext) {
    let _guard = PanicGuard(shared);
    let mut decided: Option<Arc<Snapshot>> = None;
    let mut records = 0_u64;

    let result = ctx.backend.run_read_write(&mut |rw: &mut dyn ReadWriteContext| {
        let snapshot = wait_for_command(shared);
        decided = Some(Arc::clone(&snapshot));

        let (outcome, count) = attempt(ctx, &snapshot, rw)?;
        records = count;

        Ok(outcome)
    });

    finish(shared, ctx, decided.as_deref(), records, result);
}

// Park on the gate. The first call also flips New -> Active so `start` returns.
fn wait_for_command(shared: &Shared) -> Arc<Snapshot> {
    let mut state = shared.state.lock();
    if state.status == WorkerStatus::New {
        state.status = WorkerStatus::Active;
        shared.changed.notify_all();
    }

    loop {
        if let Some(snapshot) = &state.pending {
            let snapshot = Arc::clone(snapshot);
            state.attempts = state.attempts.saturating_add(1);
            return snapshot;
        }
        shared.changed.wait(&mut state);
    }
}

// One backend invocation. Must stay a pure function of the snapshot and the
// rows it reads so that retries converge on the same writes.
fn attempt(
    ctx: &WorkerContext,
    snapshot: &Snapshot,
    rw: &mut dyn ReadWriteContext,
) -> Result<(WorkOutcome, u64), InternalError> {
    ctx.metrics.record(MetricsEvent::CommitAttempt {
        kind: snapshot.command.kind(),
    });
    let own = &snapshot.mutations;

    match &snapshot.command {
        Command::Rollback => Ok((WorkOutcome::Rollback, 0)),

        Command::Commit => {
            buffer_each(rw, own)?;
            Ok((WorkOutcome::Commit, count(own.len())))
        }

        Command::Prepare { xid_key } => {
            check_preparable(ctx, rw, own)?;
            let inserts = ctx.recovery.encode_records(xid_key, own)?;
            buffer_each(rw, &inserts)?;
            Ok((WorkOutcome::Commit, count(inserts.len())))
        }

        Command::CommitPrepared { xid_key } => {
            let staged = ctx.recovery.load(rw, xid_key)?;
            if staged.is_empty() {
                return Err(InternalError::recovery_not_found(format!(
                    "no prepared transaction recorded for '{xid_key}'"
                )));
            }

            // Phase 1: clear the records.
            buffer_each(rw, &ctx.recovery.delete_records(&staged))?;

            // Phase 2: replay in sequence order, then this session's own work.
            for record in &staged {
                rw.buffer(record.mutation.clone())?;
            }
            buffer_each(rw, own)?;

            Ok((WorkOutcome::Commit, count(staged.len())))
        }

        Command::RollbackPrepared { xid_key } => {
            let staged = ctx.recovery.load(rw, xid_key)?;
            if staged.is_empty() && own.is_empty() {
                return Ok((WorkOutcome::Rollback, 0));
            }

            buffer_each(rw, &ctx.recovery.delete_records(&staged))?;
            buffer_each(rw, own)?;

            Ok((WorkOutcome::Commit, count(staged.len())))
        }
    }
}

// A prepared branch promises its second phase can apply. Check every write
// against the catalog and the rows it depends on; the existence reads join
// this attempt's read set, so a conflicting commit before prepare lands
// re-runs the check.
fn check_preparable(
    ctx: &WorkerContext,
    rw: &mut dyn ReadWriteContext,
    mutations: &[Mutation],
) -> Result<(), InternalError> {
    let mut rows = PreparedRows::default();

    for mutation in mutations {
        let table = mutation.table();
        let schema = ctx.backend.table(table).ok_or_else(|| {
            InternalError::backend_not_found(format!("table '{table}' not found"))
        })?;

        if let Some(key_set) = mutation.key_set() {
            rows.delete(table, key_set);
            continue;
        }

        for (column, _) in mutation.columns().iter() {
            if !schema.has_column(column) {
                return Err(InternalError::backend_validation(format!(
                    "column '{column}' not found in table '{table}'"
                )));
            }
        }
        let key = mutation
            .columns()
            .key_for(schema.primary_key())
            .ok_or_else(|| {
                InternalError::backend_validation(format!(
                    "{} on '{table}' does not bind every key column",
                    mutation.kind()
                ))
            })?;

        let kind = mutation.kind();
        if matches!(kind, MutationKind::Insert | MutationKind::Update) {
            let present = rows.exists(rw, table, &key)?;
            if kind == MutationKind::Insert && present {
                return Err(InternalError::backend_already_exists(format!(
                    "row {key} already exists in '{table}'"
                )));
            }
            if kind == MutationKind::Update && !present {
                return Err(InternalError::backend_not_found(format!(
                    "row {key} not found in '{table}'"
                )));
            }
        }
        rows.written.insert((table.to_string(), key), true);
    }

    Ok(())
}

///
/// PreparedRows
///
/// Row existence as the buffer would leave it, layered over committed reads.
///

#[derive(Default)]
struct PreparedRows {
    written: BTreeMap<(String, Key), bool>,
    cleared: Vec<(String, KeySet)>,
}

impl PreparedRows {
    fn exists(
        &mut self,
        rw: &mut dyn ReadWriteContext,
        table: &str,
        key: &Key,
    ) -> Result<bool, InternalError> {
        if let Some(present) = self.written.get(&(table.to_string(), key.clone())) {
            return Ok(*present);
        }
        if self
            .cleared
            .iter()
            .any(|(cleared, key_set)| cleared == table && key_set.contains(key))
        {
            return Ok(false);
        }

        let found = rw.read(table, &KeySet::key(key.clone()))?;

        Ok(!found.is_empty())
    }

    fn delete(&mut self, table: &str, key_set: &KeySet) {
        if let KeySet::Key(key) = key_set {
            self.written.insert((table.to_string(), key.clone()), false);
            return;
        }

        self.written
            .retain(|(written, key), _| written != table || !key_set.contains(key));
        self.cleared.push((table.to_string(), key_set.clone()));
    }
}

fn buffer_each(rw: &mut dyn ReadWriteContext, mutations: &[Mutation]) -> Result<(), InternalError> {
    mutations
        .iter()
        .try_for_each(|mutation| rw.buffer(mutation.clone()))
}

fn count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

// Publish the single outcome and wake every waiter.
fn finish(
    shared: &Shared,
    ctx: &WorkerContext,
    decided: Option<&Snapshot>,
    records: u64,
    result: Result<Option<Timestamp>, InternalError>,
) {
    let result = match decided {
        Some(_) => result,
        None => result.and_then(|_| {
            Err(InternalError::worker_internal(
                "backend finished without running the session",
            ))
        }),
    };
    let kind = decided.map_or(TerminalKind::Rollback, |s| s.command.kind());

    let mut state = shared.state.lock();
    match &result {
        Ok(timestamp) => {
            state.status = decided.map_or(WorkerStatus::Aborted, |s| s.command.success_status());
            ctx.metrics
                .record(MetricsEvent::TerminalFinish { kind, records });

            match kind {
                TerminalKind::Commit | TerminalKind::Rollback => debug!(
                    "worker {}: {kind} finished ({records} mutation(s), timestamp {timestamp:?})",
                    shared.id
                ),
                _ => info!(
                    "worker {}: {kind} finished ({records} record(s), timestamp {timestamp:?})",
                    shared.id
                ),
            }
        }
        Err(err) => {
            state.status = WorkerStatus::Aborted;
            ctx.metrics.record(MetricsEvent::TransactionFailed { kind });
            debug!(
                "worker {}: {kind} failed: {}",
                shared.id,
                err.display_with_class()
            );
        }
    }
    state.outcome = Some(result);
    shared.changed.notify_all();
}

///
/// PanicGuard
///
/// Callers block until an outcome is published; a panicking session thread
/// must still publish one.
///

struct PanicGuard<'a>(&'a Shared);

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }

        let mut state = self.0.state.lock();
        if state.outcome.is_none() {
            state.status = WorkerStatus::Aborted;
            state.outcome = Some(Err(InternalError::worker_internal(
                "worker thread panicked",
            )));
            self.0.changed.notify_all();
        }
    }
}

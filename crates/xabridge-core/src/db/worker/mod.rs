//! Module: worker
//! Responsibility: one backend read-write transaction per session, driven by
//! blocking commands from caller threads.
//! Does not own: retry policy (the backend's), statement translation, or XA
//! branch bookkeeping (the bridge's).
//!
//! The session closure runs on a dedicated thread. It parks on a gate until
//! a terminal command arrives together with an immutable snapshot of the
//! buffer; every backend retry replays that same snapshot.

mod session;


use crate::{
    db::{backend::Backend, mutation::Mutation, recovery::RecoveryStore},
    error::InternalError,
    obs::{MetricsEvent, MetricsSink, TerminalKind},
    types::Timestamp,
};
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

///
/// WorkerStatus
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WorkerStatus {
    New,
    Active,
    Ended,
    Prepared,
    Committed,
    RolledBack,
    Aborted,
}

impl WorkerStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Prepared | Self::Committed | Self::RolledBack | Self::Aborted
        )
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::New => "new",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Prepared => "prepared",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

///
/// Command
///
/// Terminal command accepted by a worker session. Exactly one is processed.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Command {
    Commit,
    Rollback,
    Prepare { xid_key: String },
    CommitPrepared { xid_key: String },
    RollbackPrepared { xid_key: String },
}

impl Command {
    const fn kind(&self) -> TerminalKind {
        match self {
            Self::Commit => TerminalKind::Commit,
            Self::Rollback => TerminalKind::Rollback,
            Self::Prepare { .. } => TerminalKind::Prepare,
            Self::CommitPrepared { .. } => TerminalKind::CommitPrepared,
            Self::RollbackPrepared { .. } => TerminalKind::RollbackPrepared,
        }
    }

    const fn success_status(&self) -> WorkerStatus {
        match self {
            Self::Commit | Self::CommitPrepared { .. } => WorkerStatus::Committed,
            Self::Rollback | Self::RollbackPrepared { .. } => WorkerStatus::RolledBack,
            Self::Prepare { .. } => WorkerStatus::Prepared,
        }
    }
}

///
/// Snapshot
///
/// Terminal command plus the buffer as it stood when the command was issued.
///

#[derive(Debug)]
pub(crate) struct Snapshot {
    command: Command,
    mutations: Vec<Mutation>,
}

///
/// WorkerContext
///
/// Collaborators shared by every session a driver starts.
///

#[derive(Clone)]
pub struct WorkerContext {
    pub backend: Arc<dyn Backend>,
    pub recovery: RecoveryStore,
    pub metrics: Arc<dyn MetricsSink>,
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

///
/// WorkerState
///

#[derive(Debug)]
struct WorkerState {
    status: WorkerStatus,
    buffer: Vec<Mutation>,
    pending: Option<Arc<Snapshot>>,
    outcome: Option<Result<Option<Timestamp>, InternalError>>,
    attempts: u32,
}

///
/// Shared
///
/// Monitor between caller threads and the session thread.
///

#[derive(Debug)]
struct Shared {
    id: u64,
    state: Mutex<WorkerState>,
    changed: Condvar,
}

///
/// TransactionWorker
///

pub struct TransactionWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl TransactionWorker {
    /// Begin a session; returns once the backend is running its closure.
    pub fn start(ctx: &WorkerContext) -> Result<Self, InternalError> {
        let shared = Arc::new(Shared {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(WorkerState {
                status: WorkerStatus::New,
                buffer: Vec::new(),
                pending: None,
                outcome: None,
                attempts: 0,
            }),
            changed: Condvar::new(),
        });

        let handle = {
            let shared = Arc::clone(&shared);
            let ctx = ctx.clone();
            thread::Builder::new()
                .name(format!("xa-worker-{}", shared.id))
                .spawn(move || session::run(&shared, &ctx))
                .map_err(|err| {
                    InternalError::worker_internal(format!("failed to spawn worker thread: {err}"))
                })?
        };
        ctx.metrics.record(MetricsEvent::SessionStart);

        let worker = Self {
            shared,
            handle: Some(handle),
        };

        // Wait for the gate, or for the backend to fail before reaching it.
        let mut state = worker.shared.state.lock();
        while state.status == WorkerStatus::New && state.outcome.is_none() {
            worker.shared.changed.wait(&mut state);
        }
        if let Some(Err(err)) = &state.outcome {
            return Err(err.clone());
        }
        drop(state);

        debug!("worker {}: session started", worker.shared.id);

        Ok(worker)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.shared.state.lock().status
    }

    /// Backend closure invocations past the gate so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.shared.state.lock().attempts
    }

    /// Append one mutation to the open buffer.
    pub fn buffer(&self, mutation: Mutation) -> Result<(), InternalError> {
        self.buffer_all([mutation])
    }

    /// Append mutations in order; all or none are buffered.
    pub fn buffer_all(
        &self,
        mutations: impl IntoIterator<Item = Mutation>,
    ) -> Result<(), InternalError> {
        let mutations = mutations.into_iter().collect::<Vec<_>>();
        for mutation in &mutations {
            mutation.validate()?;
        }

        let mut state = self.shared.state.lock();
        Self::require_active(&state, "buffer")?;
        state.buffer.extend(mutations);

        Ok(())
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Drop everything buffered after the first `len` mutations.
    pub fn truncate(&self, len: usize) -> Result<(), InternalError> {
        let mut state = self.shared.state.lock();
        Self::require_active(&state, "truncate")?;
        state.buffer.truncate(len);

        Ok(())
    }

    /// Stop accepting mutations ahead of the terminal decision.
    pub fn end(&self) -> Result<(), InternalError> {
        let mut state = self.shared.state.lock();
        Self::require_active(&state, "end")?;
        state.status = WorkerStatus::Ended;
        debug!("worker {}: active -> ended", self.shared.id);

        Ok(())
    }

    /// Commit the buffer; conflicts are retried by the backend.
    pub fn commit(&self) -> Result<Timestamp, InternalError> {
        self.issue(Command::Commit)?.ok_or_else(|| {
            InternalError::worker_internal("commit finished without a commit timestamp")
        })
    }

    /// Discard the buffer. Performs no backend write.
    pub fn rollback(&self) -> Result<(), InternalError> {
        self.issue(Command::Rollback).map(|_| ())
    }

    /// Stage the buffer as recovery records for `xid_key`.
    pub fn prepare(&self, xid_key: &str) -> Result<(), InternalError> {
        self.issue(Command::Prepare {
            xid_key: xid_key.to_string(),
        })
        .map(|_| ())
    }

    /// Replay and clear the records staged for `xid_key`, plus anything buffered here.
    pub fn commit_prepared(&self, xid_key: &str) -> Result<Timestamp, InternalError> {
        self.issue(Command::CommitPrepared {
            xid_key: xid_key.to_string(),
        })?
        .ok_or_else(|| {
            InternalError::worker_internal("commit_prepared finished without a commit timestamp")
        })
    }

    /// Clear the records staged for `xid_key` without applying them.
    pub fn rollback_prepared(&self, xid_key: &str) -> Result<(), InternalError> {
        self.issue(Command::RollbackPrepared {
            xid_key: xid_key.to_string(),
        })
        .map(|_| ())
    }

    fn require_active(state: &WorkerState, op: &str) -> Result<(), InternalError> {
        if state.status == WorkerStatus::Active && state.pending.is_none() {
            Ok(())
        } else {
            Err(InternalError::worker_precondition(format!(
                "{op} requires an active session (status: {})",
                state.status
            )))
        }
    }

    // Hand the gate a snapshot and block until the session thread decides.
    fn issue(&self, command: Command) -> Result<Option<Timestamp>, InternalError> {
        let mut state = self.shared.state.lock();

        if state.pending.is_some() || state.status.is_terminal() {
            return Err(InternalError::worker_precondition(format!(
                "{} rejected: a terminal command was already issued (status: {})",
                command.kind(),
                state.status
            )));
        }
        let allowed = match command {
            Command::Prepare { .. } => state.status == WorkerStatus::Ended,
            _ => matches!(state.status, WorkerStatus::Active | WorkerStatus::Ended),
        };
        if !allowed {
            return Err(InternalError::worker_precondition(format!(
                "{} is not allowed while the session is {}",
                command.kind(),
                state.status
            )));
        }

        debug!(
            "worker {}: issuing {} with {} buffered mutation(s)",
            self.shared.id,
            command.kind(),
            state.buffer.len()
        );
        let mutations = std::mem::take(&mut state.buffer);
        state.pending = Some(Arc::new(Snapshot { command, mutations }));
        self.shared.changed.notify_all();

        while state.outcome.is_none() {
            self.shared.changed.wait(&mut state);
        }

        state
            .outcome
            .clone()
            .unwrap_or_else(|| Err(InternalError::worker_internal("worker outcome missing")))
    }
}

impl fmt::Debug for TransactionWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionWorker")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}

impl Drop for TransactionWorker {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if state.pending.is_none() && !state.status.is_terminal() && state.outcome.is_none() {
                debug!("worker {}: dropped while open, rolling back", self.shared.id);
                state.pending = Some(Arc::new(Snapshot {
                    command: Command::Rollback,
                    mutations: Vec::new(),
                }));
                self.shared.changed.notify_all();
            }
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

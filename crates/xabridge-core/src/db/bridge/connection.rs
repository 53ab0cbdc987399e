use crate::{
    db::{
        bridge::{DriverInner, xa::Branch},
        keepalive::KeepAliveLease,
        mutation::Mutation,
        sql::{Parameters, Statement, analyze},
        worker::TransactionWorker,
    },
    error::InternalError,
    obs::MetricsEvent,
    types::Timestamp,
};
use log::debug;
use std::{fmt, sync::Arc};

///
/// ExecuteOutcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecuteOutcome {
    /// Read-only statement; nothing buffered.
    Query,

    /// Buffered in the open transaction or branch.
    Buffered,

    /// Committed immediately in autocommit mode.
    Committed(Timestamp),
}

///
/// Savepoint
///
/// Named mark into the local transaction buffer.
///

#[derive(Debug)]
struct Savepoint {
    name: String,
    mark: usize,
}

///
/// Connection
///

pub struct Connection {
    pub(super) driver: Arc<DriverInner>,
    pub(super) branch: Option<Branch>,
    local: Option<TransactionWorker>,
    savepoints: Vec<Savepoint>,
    autocommit: bool,
    closed: bool,
    _lease: KeepAliveLease,
}

impl Connection {
    pub(super) fn new(driver: Arc<DriverInner>, lease: KeepAliveLease) -> Self {
        let autocommit = driver.config.autocommit;

        Self {
            driver,
            branch: None,
            local: None,
            savepoints: Vec::new(),
            autocommit,
            closed: false,
            _lease: lease,
        }
    }

    #[must_use]
    pub const fn autocommit(&self) -> bool {
        self.autocommit
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Mutations buffered in the open local transaction.
    #[must_use]
    pub fn pending_mutations(&self) -> usize {
        self.local.as_ref().map_or(0, TransactionWorker::buffered_len)
    }

    /// Translate and route one statement.
    pub fn execute(
        &mut self,
        statement: &Statement,
        params: &Parameters,
    ) -> Result<ExecuteOutcome, InternalError> {
        self.ensure_open()?;

        let bound = analyze(statement, self.driver.workers.backend.as_ref())
            .map_err(InternalError::from)
            .and_then(|plan| plan.bind(params));
        let mutation = match bound {
            Ok(Some(mutation)) => mutation,
            Ok(None) => return Ok(ExecuteOutcome::Query),
            Err(err) => {
                if err.is_validation() {
                    self.driver
                        .workers
                        .metrics
                        .record(MetricsEvent::ValidationRejected);
                }
                return Err(err);
            }
        };

        self.buffer(mutation)
    }

    /// Route a prebuilt mutation: active branch, autocommit, or local transaction.
    pub fn buffer(&mut self, mutation: Mutation) -> Result<ExecuteOutcome, InternalError> {
        self.ensure_open()?;

        if let Some(branch) = &self.branch {
            branch.worker.buffer(mutation)?;
            return Ok(ExecuteOutcome::Buffered);
        }

        if self.autocommit {
            let worker = self.start_worker()?;
            worker.buffer(mutation)?;
            return worker.commit().map(ExecuteOutcome::Committed);
        }

        self.local_worker()?.buffer(mutation)?;

        Ok(ExecuteOutcome::Buffered)
    }

    /// Switching autocommit on commits any open local transaction.
    pub fn set_autocommit(&mut self, autocommit: bool) -> Result<(), InternalError> {
        self.ensure_open()?;
        self.ensure_no_branch("set_autocommit")?;

        if autocommit && !self.autocommit {
            self.commit_local()?;
        }
        self.autocommit = autocommit;

        Ok(())
    }

    /// Commit the local transaction; `None` when nothing was open.
    pub fn commit(&mut self) -> Result<Option<Timestamp>, InternalError> {
        self.ensure_open()?;
        self.ensure_no_branch("commit")?;
        self.ensure_manual("commit")?;

        self.commit_local()
    }

    pub fn rollback(&mut self) -> Result<(), InternalError> {
        self.ensure_open()?;
        self.ensure_no_branch("rollback")?;
        self.ensure_manual("rollback")?;

        self.rollback_local()
    }

    pub fn set_savepoint(&mut self, name: &str) -> Result<(), InternalError> {
        self.ensure_open()?;
        self.ensure_no_branch("set_savepoint")?;
        self.ensure_manual("set_savepoint")?;
        if name.is_empty() {
            return Err(InternalError::bridge_precondition("savepoint name is empty"));
        }

        let mark = self.local_worker()?.buffered_len();
        self.savepoints.push(Savepoint {
            name: name.to_string(),
            mark,
        });

        Ok(())
    }

    /// Discard work buffered after `name`; the savepoint itself survives.
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), InternalError> {
        self.ensure_open()?;
        self.ensure_no_branch("rollback_to_savepoint")?;

        let index = self.savepoint_index(name)?;
        let mark = self.savepoints[index].mark;
        if let Some(worker) = &self.local {
            worker.truncate(mark)?;
        }
        self.savepoints.truncate(index + 1);

        Ok(())
    }

    /// Forget `name` and every savepoint set after it; buffered work is kept.
    pub fn release_savepoint(&mut self, name: &str) -> Result<(), InternalError> {
        self.ensure_open()?;
        self.ensure_no_branch("release_savepoint")?;

        let index = self.savepoint_index(name)?;
        self.savepoints.truncate(index);

        Ok(())
    }

    /// Roll back open work and release the connection's resources.
    ///
    /// Prepared branches are unaffected; their records stay in the recovery
    /// table until a commit or rollback names their xid.
    pub fn close(&mut self) -> Result<(), InternalError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let branch = self.branch.take().map(|branch| branch.worker.rollback());
        let local = self.rollback_local();
        debug!("connection: closed");

        branch.transpose().and(local)
    }

    //
    // internals
    //

    pub(super) fn ensure_open(&self) -> Result<(), InternalError> {
        if self.closed {
            Err(InternalError::bridge_precondition("connection is closed"))
        } else {
            Ok(())
        }
    }

    fn ensure_no_branch(&self, op: &str) -> Result<(), InternalError> {
        match &self.branch {
            Some(branch) => Err(InternalError::bridge_precondition(format!(
                "{op} is not allowed while xa branch {} is active",
                branch.xid
            ))),
            None => Ok(()),
        }
    }

    fn ensure_manual(&self, op: &str) -> Result<(), InternalError> {
        if self.autocommit {
            Err(InternalError::bridge_precondition(format!(
                "{op} is not allowed in autocommit mode"
            )))
        } else {
            Ok(())
        }
    }

    pub(super) fn has_local_work(&self) -> bool {
        self.pending_mutations() > 0
    }

    /// Drop an empty local session so a branch can start.
    pub(super) fn discard_empty_local(&mut self) -> Result<(), InternalError> {
        self.rollback_local()
    }

    pub(super) fn start_worker(&self) -> Result<TransactionWorker, InternalError> {
        TransactionWorker::start(&self.driver.workers)
    }

    fn local_worker(&mut self) -> Result<&TransactionWorker, InternalError> {
        if self.local.is_none() {
            self.local = Some(self.start_worker()?);
        }

        self.local
            .as_ref()
            .ok_or_else(|| InternalError::bridge_internal("local session missing"))
    }

    fn commit_local(&mut self) -> Result<Option<Timestamp>, InternalError> {
        self.savepoints.clear();
        match self.local.take() {
            Some(worker) => worker.commit().map(Some),
            None => Ok(None),
        }
    }

    fn rollback_local(&mut self) -> Result<(), InternalError> {
        self.savepoints.clear();
        match self.local.take() {
            Some(worker) => worker.rollback(),
            None => Ok(()),
        }
    }

    fn savepoint_index(&self, name: &str) -> Result<usize, InternalError> {
        self.savepoints
            .iter()
            .rposition(|sp| sp.name == name)
            .ok_or_else(|| {
                InternalError::bridge_precondition(format!("savepoint '{name}' does not exist"))
            })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("autocommit", &self.autocommit)
            .field("closed", &self.closed)
            .field("branch", &self.branch.as_ref().map(|b| &b.xid))
            .field("pending_mutations", &self.pending_mutations())
            .field("savepoints", &self.savepoints.len())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

use crate::{
    db::{
        bridge::{Connection, XidClaim},
        worker::{TransactionWorker, WorkerStatus},
        xid::Xid,
    },
    error::InternalError,
    types::Timestamp,
};
use log::debug;

///
/// XaVote
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum XaVote {
    /// Records staged; a second phase must follow.
    Ok,

    /// Nothing was buffered; the branch is already complete.
    ReadOnly,
}

///
/// Branch
///
/// The distributed-transaction branch bound to a connection.
///

pub(super) struct Branch {
    pub(super) xid: Xid,
    pub(super) worker: TransactionWorker,
    claim: XidClaim,
}

impl Connection {
    /// Bind a new branch to this connection.
    pub fn xa_start(&mut self, xid: &Xid) -> Result<(), InternalError> {
        self.ensure_open()?;
        if let Some(branch) = &self.branch {
            return Err(InternalError::bridge_precondition(format!(
                "xa branch {} is already active on this connection",
                branch.xid
            )));
        }
        if self.has_local_work() {
            return Err(InternalError::bridge_precondition(
                "xa_start with uncommitted local work",
            ));
        }
        self.discard_empty_local()?;

        let claim = self.driver.claim(xid)?;
        let worker = self.start_worker()?;
        debug!("xa: started branch {xid} on worker {}", worker.id());

        self.branch = Some(Branch {
            xid: xid.clone(),
            worker,
            claim,
        });

        Ok(())
    }

    /// Stop accepting work for the branch ahead of prepare or commit.
    pub fn xa_end(&mut self, xid: &Xid) -> Result<(), InternalError> {
        self.ensure_open()?;
        self.branch_for(xid)?.worker.end()?;
        debug!("xa: ended branch {xid}");

        Ok(())
    }

    /// First phase. An empty branch votes read-only and is finished here.
    pub fn xa_prepare(&mut self, xid: &Xid) -> Result<XaVote, InternalError> {
        self.ensure_open()?;
        let branch = self.branch_for(xid)?;
        if branch.worker.status() != WorkerStatus::Ended {
            return Err(InternalError::bridge_precondition(format!(
                "xa_prepare requires xa_end on branch {xid}"
            )));
        }

        let branch = self.take_branch()?;
        if branch.worker.buffered_len() == 0 {
            branch.worker.rollback()?;
            return Ok(XaVote::ReadOnly);
        }
        branch.worker.prepare(branch.claim.key())?;

        Ok(XaVote::Ok)
    }

    /// Second phase, or a one-phase commit of the branch bound here.
    pub fn xa_commit(&mut self, xid: &Xid, one_phase: bool) -> Result<Timestamp, InternalError> {
        self.ensure_open()?;

        if self.owns_branch(xid) {
            if !one_phase {
                return Err(InternalError::bridge_precondition(format!(
                    "branch {xid} was not prepared; use a one-phase commit"
                )));
            }
            let branch = self.take_branch()?;
            return branch.worker.commit();
        }
        if one_phase {
            return Err(InternalError::bridge_precondition(format!(
                "one-phase commit of {xid} requires its branch on this connection"
            )));
        }

        let (claim, worker) = self.second_phase_session(xid)?;
        let committed = worker.commit_prepared(claim.key());
        drop(claim);

        committed
    }

    /// Roll back the bound branch, or the prepared records of `xid`.
    pub fn xa_rollback(&mut self, xid: &Xid) -> Result<(), InternalError> {
        self.ensure_open()?;

        if self.owns_branch(xid) {
            let branch = self.take_branch()?;
            return branch.worker.rollback();
        }

        let (claim, worker) = self.second_phase_session(xid)?;
        let rolled_back = worker.rollback_prepared(claim.key());
        drop(claim);

        rolled_back
    }

    /// Xids with staged records awaiting a second phase.
    pub fn xa_recover(&self) -> Result<Vec<Xid>, InternalError> {
        self.ensure_open()?;

        self.driver.recover()
    }

    //
    // internals
    //

    fn owns_branch(&self, xid: &Xid) -> bool {
        self.branch.as_ref().is_some_and(|branch| branch.xid == *xid)
    }

    fn branch_for(&self, xid: &Xid) -> Result<&Branch, InternalError> {
        match &self.branch {
            Some(branch) if branch.xid == *xid => Ok(branch),
            Some(branch) => Err(InternalError::bridge_precondition(format!(
                "xid {xid} does not match active branch {}",
                branch.xid
            ))),
            None => Err(InternalError::bridge_precondition(format!(
                "no active branch for xid {xid}"
            ))),
        }
    }

    fn take_branch(&mut self) -> Result<Branch, InternalError> {
        self.branch
            .take()
            .ok_or_else(|| InternalError::bridge_internal("xa branch vanished"))
    }

    // A fresh session for the second phase of a branch prepared elsewhere.
    fn second_phase_session(
        &self,
        xid: &Xid,
    ) -> Result<(XidClaim, TransactionWorker), InternalError> {
        if let Some(branch) = &self.branch {
            return Err(InternalError::bridge_precondition(format!(
                "second phase of {xid} while branch {} is active",
                branch.xid
            )));
        }

        let claim = self.driver.claim(xid)?;
        let worker = self.start_worker()?;

        Ok((claim, worker))
    }
}

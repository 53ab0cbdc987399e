//! Module: bridge
//! Responsibility: connection-level transaction semantics on top of worker sessions.
//! Does not own: retry, mutation application, or record encoding.
//!
//! A `Driver` is shared by every `Connection` it hands out. It owns the
//! backend handle, the recovery store, the metrics sink and the keep-alive
//! timer, and it guarantees that at most one session runs per xid key.

mod connection;
mod xa;


use crate::{
    config::DriverConfig,
    db::{
        backend::{Backend, ReadWriteContext, WorkOutcome},
        keepalive::KeepAliveTimer,
        recovery::RecoveryStore,
        worker::WorkerContext,
        xid::Xid,
    },
    error::InternalError,
    obs::{MetricsSink, NoopMetricsSink},
};
use log::debug;
use parking_lot::Mutex;
use std::{collections::BTreeSet, fmt, sync::Arc};

pub use connection::{Connection, ExecuteOutcome};
pub use xa::XaVote;

///
/// Driver
///

#[derive(Clone)]
pub struct Driver {
    inner: Arc<DriverInner>,
}

struct DriverInner {
    config: DriverConfig,
    workers: WorkerContext,
    keep_alive: KeepAliveTimer,
    claimed_xids: Mutex<BTreeSet<String>>,
}

impl Driver {
    pub fn new(backend: Arc<dyn Backend>, config: DriverConfig) -> Result<Self, InternalError> {
        Self::with_metrics(backend, config, Arc::new(NoopMetricsSink))
    }

    /// Validate `config`, create the recovery table if needed, and build a driver.
    pub fn with_metrics(
        backend: Arc<dyn Backend>,
        config: DriverConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, InternalError> {
        config.validate()?;

        let recovery = RecoveryStore::from_config(&config);
        recovery.ensure_table(backend.as_ref())?;
        let keep_alive = KeepAliveTimer::new(Arc::clone(&backend), config.keep_alive_interval());

        debug!(
            "driver: ready (recovery table '{}', autocommit {})",
            recovery.table(),
            config.autocommit
        );

        Ok(Self {
            inner: Arc::new(DriverInner {
                config,
                workers: WorkerContext {
                    backend,
                    recovery,
                    metrics,
                },
                keep_alive,
                claimed_xids: Mutex::new(BTreeSet::new()),
            }),
        })
    }

    /// Open a connection; it holds a keep-alive lease until closed.
    pub fn connect(&self) -> Result<Connection, InternalError> {
        let lease = self.inner.keep_alive.acquire()?;

        Ok(Connection::new(Arc::clone(&self.inner), lease))
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn keep_alive(&self) -> &KeepAliveTimer {
        &self.inner.keep_alive
    }

    /// Xids with staged records in the recovery table.
    pub fn recover(&self) -> Result<Vec<Xid>, InternalError> {
        self.inner.recover()
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl DriverInner {
    fn recover(&self) -> Result<Vec<Xid>, InternalError> {
        let recovery = &self.workers.recovery;
        let mut keys = Vec::new();
        self.workers.backend.run_read_write(&mut |ctx: &mut dyn ReadWriteContext| {
            keys = recovery.pending_xid_keys(ctx)?;
            Ok(WorkOutcome::Rollback)
        })?;

        let mut xids = Vec::with_capacity(keys.len());
        let mut undecodable = Vec::new();
        for key in keys {
            match Xid::from_key(&key) {
                Ok(xid) => xids.push(xid),
                Err(err) => undecodable.push(format!("'{key}' ({err})")),
            }
        }
        if !undecodable.is_empty() {
            return Err(InternalError::recovery_inconsistency(format!(
                "recovery table '{}' holds records for undecodable xid keys: {}",
                recovery.table(),
                undecodable.join(", ")
            )));
        }

        Ok(xids)
    }

    fn claim(self: &Arc<Self>, xid: &Xid) -> Result<XidClaim, InternalError> {
        let key = xid.key();
        if !self.claimed_xids.lock().insert(key.clone()) {
            return Err(InternalError::bridge_precondition(format!(
                "xid {xid} already has a running session"
            )));
        }

        Ok(XidClaim {
            driver: Arc::clone(self),
            key,
        })
    }
}

///
/// XidClaim
///
/// Exclusive right to run a session for one xid key; released on drop.
///

struct XidClaim {
    driver: Arc<DriverInner>,
    key: String,
}

impl XidClaim {
    fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for XidClaim {
    fn drop(&mut self) {
        self.driver.claimed_xids.lock().remove(&self.key);
    }
}

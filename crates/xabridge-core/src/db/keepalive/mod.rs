//! Shared keep-alive timer.
//!
//! One background thread per driver pings the backend while at least one
//! lease is held. The thread starts with the first lease and is stopped and
//! joined when the last lease drops.


use crate::{db::backend::Backend, error::InternalError};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

///
/// KeepAliveTimer
///

#[derive(Clone)]
pub struct KeepAliveTimer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    backend: Arc<dyn Backend>,
    interval: Option<Duration>,
    state: Mutex<TimerState>,
    wake: Condvar,
    ticks: AtomicU64,
}

#[derive(Default)]
struct TimerState {
    leases: usize,

    // Bumped on every start and stop; a thread exits once it no longer matches.
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl KeepAliveTimer {
    /// `None` disables the timer; leases are still counted.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, interval: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                backend,
                interval,
                state: Mutex::new(TimerState::default()),
                wake: Condvar::new(),
                ticks: AtomicU64::new(0),
            }),
        }
    }

    pub fn acquire(&self) -> Result<KeepAliveLease, InternalError> {
        let mut state = self.inner.state.lock();

        if state.leases == 0
            && let Some(interval) = self.inner.interval
        {
            state.generation += 1;
            let generation = state.generation;
            let inner = Arc::clone(&self.inner);
            let handle = thread::Builder::new()
                .name("xa-keep-alive".to_string())
                .spawn(move || inner.run(generation, interval))
                .map_err(|err| {
                    InternalError::bridge_internal(format!(
                        "failed to spawn keep-alive thread: {err}"
                    ))
                })?;
            state.handle = Some(handle);
            debug!("keep-alive: started ({interval:?})");
        }
        state.leases += 1;

        Ok(KeepAliveLease {
            inner: Arc::clone(&self.inner),
        })
    }

    #[must_use]
    pub fn active_leases(&self) -> usize {
        self.inner.state.lock().leases
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().handle.is_some()
    }

    /// Completed keep-alive pings since construction.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for KeepAliveTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAliveTimer")
            .field("interval", &self.inner.interval)
            .field("leases", &self.active_leases())
            .finish_non_exhaustive()
    }
}

impl TimerInner {
    fn run(&self, generation: u64, interval: Duration) {
        let mut state = self.state.lock();
        loop {
            let timeout = self.wake.wait_for(&mut state, interval);
            if state.generation != generation {
                break;
            }
            if !timeout.timed_out() {
                continue;
            }

            drop(state);
            match self.backend.keep_alive() {
                Ok(()) => {
                    self.ticks.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => warn!("keep-alive: ping failed: {err}"),
            }
            state = self.state.lock();
        }
    }

    fn release(&self) {
        let handle = {
            let mut state = self.state.lock();
            state.leases = state.leases.saturating_sub(1);
            if state.leases > 0 {
                return;
            }
            state.generation += 1;
            self.wake.notify_all();
            state.handle.take()
        };

        if let Some(handle) = handle {
            let _ = handle.join();
            debug!("keep-alive: stopped");
        }
    }
}

///
/// KeepAliveLease
///
/// Holding a lease keeps the timer thread alive.
///

pub struct KeepAliveLease {
    inner: Arc<TimerInner>,
}

impl fmt::Debug for KeepAliveLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeepAliveLease")
    }
}

impl Drop for KeepAliveLease {
    fn drop(&mut self) {
        self.inner.release();
    }
}

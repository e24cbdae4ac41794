//! Branch change notifier.
//!
//! Polls the branch provider on its own thread and reports changes through a
//! callback. It never touches group state itself; the callback is expected to
//! route into [`GroupService::on_branch_changed`](crate::plugins::groups::GroupService::on_branch_changed)
//! on whatever thread owns the store.

use crate::core::branch::BranchNameProvider;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchChange {
    pub from: String,
    pub to: String,
}

/// Remembers the last observed branch. The first observation only seeds.
#[derive(Debug, Default, Clone)]
pub struct BranchChangeDetector {
    last: Option<String>,
}

impl BranchChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(branch: impl Into<String>) -> Self {
        Self {
            last: Some(branch.into()),
        }
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn observe(&mut self, branch: &str) -> Option<BranchChange> {
        match self.last.replace(branch.to_string()) {
            Some(previous) if previous != branch => Some(BranchChange {
                from: previous,
                to: branch.to_string(),
            }),
            _ => None,
        }
    }
}

pub struct BranchPoller {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BranchPoller {
    /// Spawns the polling thread. The first poll happens after
    /// `initial_delay`, then every `interval`.
    pub fn start<F>(
        provider: Arc<dyn BranchNameProvider>,
        initial_delay: Duration,
        interval: Duration,
        on_change: F,
    ) -> std::io::Result<Self>
    where
        F: Fn(BranchChange) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("tabgroups-branch-poller".to_string())
            .spawn(move || {
                let mut detector = BranchChangeDetector::new();
                let mut wait = initial_delay;
                loop {
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    wait = interval;
                    if let Some(change) = poll_once(provider.as_ref(), &mut detector) {
                        info!(from = %change.from, to = %change.to, "branch changed");
                        on_change(change);
                    }
                }
                debug!("branch poller stopped");
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops and joins the polling thread. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("branch poller thread panicked");
            }
        }
    }
}

impl Drop for BranchPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One poll. A provider that panics counts as "no change".
pub fn poll_once(
    provider: &dyn BranchNameProvider,
    detector: &mut BranchChangeDetector,
) -> Option<BranchChange> {
    match panic::catch_unwind(AssertUnwindSafe(|| provider.current_branch_name())) {
        Ok(branch) => detector.observe(&branch),
        Err(_) => {
            warn!("branch provider failed; skipping this poll");
            None
        }
    }
}

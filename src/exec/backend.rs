// src/exec/backend.rs

//! Pluggable runner backend abstraction.
//!
//! The runtime talks to a `RunnerBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake runner in tests while keeping
//! the production process handling in [`super::process`].
//!
//! - `ProcessRunner` is the default implementation used by `devloop`. It
//!   spawns one process per run and tracks the live run's cancel channel.
//! - Tests can provide their own `RunnerBackend` that records which runs were
//!   started or cancelled and emits `RunFinished` events directly.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::engine::{RunId, ScheduledRun, SessionEvent};
use crate::errors::Result;

use super::process::run_process;

/// Trait abstracting how scheduled runs are executed.
///
/// Production code uses [`ProcessRunner`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait RunnerBackend: Send {
    /// Launch the given run. Must not block on the process; completion is
    /// reported back asynchronously as `SessionEvent::RunFinished`.
    fn start_run(
        &mut self,
        run: ScheduledRun,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Begin terminating the given run's process. The backend must still
    /// deliver `RunFinished` for it once the process has been reaped.
    fn cancel_run(
        &mut self,
        id: RunId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Live-run bookkeeping: the id plus the cancellation channel into its
/// process task.
struct LiveRun {
    id: RunId,
    cancel_tx: oneshot::Sender<()>,
}

/// Real runner backend used in production.
///
/// Each started run gets its own Tokio task (see [`run_process`]) and a
/// oneshot cancel channel. The core guarantees at most one run is live, so a
/// single slot suffices.
pub struct ProcessRunner {
    session_tx: mpsc::Sender<SessionEvent>,
    grace: Duration,
    live: Option<LiveRun>,
}

impl ProcessRunner {
    /// Create a new process runner reporting into the given session channel.
    ///
    /// `grace` is how long a cancelled process gets between the termination
    /// signal and a forced kill.
    pub fn new(session_tx: mpsc::Sender<SessionEvent>, grace: Duration) -> Self {
        Self {
            session_tx,
            grace,
            live: None,
        }
    }
}

impl RunnerBackend for ProcessRunner {
    fn start_run(
        &mut self,
        run: ScheduledRun,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        if let Some(old) = self.live.replace(LiveRun {
            id: run.id,
            cancel_tx,
        }) {
            // The previous run has already been reaped by the time the core
            // starts a new one; its slot is simply stale.
            debug!(stale_run_id = old.id, "replacing finished run slot");
        }

        let session_tx = self.session_tx.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            run_process(run, grace, session_tx, cancel_rx).await;
        });

        Box::pin(async { Ok(()) })
    }

    fn cancel_run(
        &mut self,
        id: RunId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        match self.live.take() {
            Some(live) if live.id == id => {
                // The process task reacts by walking its termination state
                // machine and reporting RunFinished when the child is reaped.
                if live.cancel_tx.send(()).is_err() {
                    debug!(run_id = id, "run already finishing; cancel was a no-op");
                }
            }
            Some(live) => {
                warn!(run_id = id, live_run_id = live.id, "cancel for unknown run");
                self.live = Some(live);
            }
            None => {
                debug!(run_id = id, "cancel with no live run");
            }
        }
        Box::pin(async { Ok(()) })
    }
}

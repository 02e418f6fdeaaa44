use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tokio::sync::mpsc;

use devloop::engine::{RunEnd, RunId, ScheduledRun, SessionEvent};
use devloop::errors::Result;
use devloop::exec::RunnerBackend;

/// Per-run control state for a manual-mode fake runner.
#[derive(Debug, Default)]
struct RunControl {
    cancelled: bool,
    finished: bool,
}

/// A fake runner backend that records which runs were started and cancelled
/// without spawning processes.
///
/// Two modes:
/// - `auto()`: every started run immediately reports `Exited(0)`.
/// - `manual()`: runs stay "live" until the test calls [`FakeRunner::finish`];
///   a cancelled run reports `Signaled` only when finished, which lets tests
///   observe that the engine does not start the next run before the previous
///   one has been reaped.
pub struct FakeRunner {
    session_tx: mpsc::Sender<SessionEvent>,
    auto_complete: bool,
    started: Arc<Mutex<Vec<ScheduledRun>>>,
    cancelled: Arc<Mutex<Vec<RunId>>>,
    controls: Arc<Mutex<HashMap<RunId, RunControl>>>,
}

impl FakeRunner {
    pub fn auto(session_tx: mpsc::Sender<SessionEvent>) -> Self {
        Self::new(session_tx, true)
    }

    pub fn manual(session_tx: mpsc::Sender<SessionEvent>) -> Self {
        Self::new(session_tx, false)
    }

    fn new(session_tx: mpsc::Sender<SessionEvent>, auto_complete: bool) -> Self {
        Self {
            session_tx,
            auto_complete,
            started: Arc::new(Mutex::new(Vec::new())),
            cancelled: Arc::new(Mutex::new(Vec::new())),
            controls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ids of runs started so far, in order.
    pub fn started_ids(&self) -> Vec<RunId> {
        self.started.lock().unwrap().iter().map(|r| r.id).collect()
    }

    /// Ids of runs cancelled so far, in order.
    pub fn cancelled_ids(&self) -> Vec<RunId> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Shared handles for asserting after the runner has been moved into the
    /// runtime.
    pub fn handles(&self) -> FakeRunnerHandles {
        FakeRunnerHandles {
            session_tx: self.session_tx.clone(),
            started: Arc::clone(&self.started),
            cancelled: Arc::clone(&self.cancelled),
            controls: Arc::clone(&self.controls),
        }
    }
}

/// Cloneable view onto a [`FakeRunner`]'s recorded state, usable while the
/// runner itself is owned by the runtime under test.
#[derive(Clone)]
pub struct FakeRunnerHandles {
    session_tx: mpsc::Sender<SessionEvent>,
    started: Arc<Mutex<Vec<ScheduledRun>>>,
    cancelled: Arc<Mutex<Vec<RunId>>>,
    controls: Arc<Mutex<HashMap<RunId, RunControl>>>,
}

impl FakeRunnerHandles {
    pub fn started_ids(&self) -> Vec<RunId> {
        self.started.lock().unwrap().iter().map(|r| r.id).collect()
    }

    pub fn cancelled_ids(&self) -> Vec<RunId> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Finish a manually-controlled run: reports `Signaled` if it was
    /// cancelled, `Exited(0)` otherwise.
    pub async fn finish(&self, id: RunId) {
        let end = {
            let mut controls = self.controls.lock().unwrap();
            let control = controls.entry(id).or_default();
            assert!(!control.finished, "run {id} finished twice");
            control.finished = true;
            if control.cancelled {
                RunEnd::Signaled
            } else {
                RunEnd::Exited(0)
            }
        };

        self.session_tx
            .send(SessionEvent::RunFinished {
                id,
                started_at: SystemTime::now(),
                end,
            })
            .await
            .expect("session channel closed");
    }

    /// Finish a manually-controlled run with a specific exit code.
    pub async fn finish_with_code(&self, id: RunId, code: i32) {
        {
            let mut controls = self.controls.lock().unwrap();
            let control = controls.entry(id).or_default();
            assert!(!control.finished, "run {id} finished twice");
            control.finished = true;
        }

        self.session_tx
            .send(SessionEvent::RunFinished {
                id,
                started_at: SystemTime::now(),
                end: RunEnd::Exited(code),
            })
            .await
            .expect("session channel closed");
    }
}

impl RunnerBackend for FakeRunner {
    fn start_run(
        &mut self,
        run: ScheduledRun,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.started.lock().unwrap().push(run.clone());
        self.controls
            .lock()
            .unwrap()
            .insert(run.id, RunControl::default());

        let auto = self.auto_complete;
        let tx = self.session_tx.clone();
        let controls = Arc::clone(&self.controls);

        Box::pin(async move {
            if auto {
                controls.lock().unwrap().entry(run.id).or_default().finished = true;
                // Completion must arrive as an event, not inline, so the
                // runtime loop observes it on its next iteration like it
                // would a real process exit.
                tokio::spawn(async move {
                    let _ = tx
                        .send(SessionEvent::RunFinished {
                            id: run.id,
                            started_at: SystemTime::now(),
                            end: RunEnd::Exited(0),
                        })
                        .await;
                });
            }
            Ok(())
        })
    }

    fn cancel_run(
        &mut self,
        id: RunId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.cancelled.lock().unwrap().push(id);
        self.controls.lock().unwrap().entry(id).or_default().cancelled = true;
        Box::pin(async { Ok(()) })
    }
}

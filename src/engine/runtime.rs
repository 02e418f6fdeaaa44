// src/engine/runtime.rs

use std::fmt;
use std::io::Write;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::core::{CoreCommand, CoreSession, CoreStep};
use crate::engine::{RunEnd, RunRecord, SessionEvent, SessionOptions};
use crate::errors::Result;
use crate::exec::RunnerBackend;

/// Drives the session in response to `SessionEvent`s, and delegates process
/// start/cancel to a `RunnerBackend`.
///
/// This is a pure IO shell around `CoreSession`, which contains all the
/// session semantics. This struct handles async IO: reading events from the
/// channel, dispatching to the backend, and reporting run outcomes.
pub struct Runtime<B: RunnerBackend> {
    core: CoreSession,
    event_rx: mpsc::Receiver<SessionEvent>,
    backend: B,
    options: SessionOptions,
}

impl<B: RunnerBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<B: RunnerBackend> Runtime<B> {
    pub fn new(
        core: CoreSession,
        event_rx: mpsc::Receiver<SessionEvent>,
        backend: B,
        options: SessionOptions,
    ) -> Self {
        Self {
            core,
            event_rx,
            backend,
            options,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `SessionEvent`s from `event_rx`.
    /// - Feeds them into the pure core.
    /// - Executes the commands returned by the core (start/cancel/report).
    pub async fn run(mut self) -> Result<()> {
        info!("devloop session started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("session event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "session received event");

            let step: CoreStep = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping session");
                break;
            }
        }

        info!("session exiting");
        Ok(())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::StartRun(run) => {
                if self.options.clear_screen {
                    clear_screen();
                }
                info!(run_id = run.id, command = %run.action, "starting run");
                self.backend.start_run(run).await?;
            }
            CoreCommand::CancelRun(id) => {
                debug!(run_id = id, "cancelling run");
                self.backend.cancel_run(id).await?;
            }
            CoreCommand::ReportRun(record) => report_run(&record),
            CoreCommand::ReportSuperseded { id } => {
                info!(run_id = id, "run superseded by newer changes");
            }
        }
        Ok(())
    }
}

/// Surface one run's outcome so success, failure, and launch errors are each
/// distinguishable at a glance.
fn report_run(record: &RunRecord) {
    let elapsed_ms = record
        .started_at
        .elapsed()
        .map(|d| d.as_millis())
        .unwrap_or_default();

    match &record.end {
        RunEnd::Exited(0) => {
            info!(run_id = record.id, elapsed_ms, "run succeeded");
        }
        RunEnd::Exited(code) => {
            warn!(run_id = record.id, exit_code = code, elapsed_ms, "run failed");
        }
        RunEnd::Signaled => {
            warn!(run_id = record.id, elapsed_ms, "run terminated by signal");
        }
        RunEnd::SpawnFailed(reason) => {
            error!(
                run_id = record.id,
                command = %record.action,
                %reason,
                "failed to launch command; waiting for the next change"
            );
        }
    }
}

/// Start a fresh "screen" for the next run's output.
fn clear_screen() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x1b[2J\x1b[1;1H");
    let _ = stdout.flush();
}

// src/exec/process.rs

//! Individual run process lifecycle.
//!
//! One invocation of [`run_process`] owns one child process from spawn to
//! reap. The child runs with inherited stdout/stderr so the developer sees
//! its output live, and (on Unix) in its own process group so cancellation
//! reaches the whole tree it may have spawned.
//!
//! Cancellation walks an explicit state machine:
//! Running -> SignalSent -> (Exited | ForceKilled).

use std::process::Stdio;
use std::time::{Duration, SystemTime};

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::engine::{RunEnd, RunId, ScheduledRun, SessionEvent};
use crate::types::Action;

/// Run a single process for `run`, reporting `RunFinished` once the process
/// has been reaped (normal exit, cancellation, or spawn failure).
///
/// The `RunFinished` event is always sent: the engine relies on it to know
/// the run slot is free before starting the next run.
pub async fn run_process(
    run: ScheduledRun,
    grace: Duration,
    session_tx: mpsc::Sender<SessionEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let started_at = SystemTime::now();

    let mut child = match build_command(&run.action).spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(
                run_id = run.id,
                command = %run.action,
                error = %err,
                "failed to spawn run process"
            );
            send_finished(
                &session_tx,
                &run,
                started_at,
                RunEnd::SpawnFailed(err.to_string()),
            )
            .await;
            return;
        }
    };

    info!(
        run_id = run.id,
        pid = child.id(),
        command = %run.action,
        "run process started"
    );

    let end = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                let end = end_from_status_code(status.code());
                info!(
                    run_id = run.id,
                    exit_code = status.code(),
                    success = status.success(),
                    "run process exited"
                );
                end
            }
            Err(err) => {
                warn!(run_id = run.id, error = %err, "failed waiting for run process");
                RunEnd::Signaled
            }
        },
        cancel = &mut cancel_rx => match cancel {
            Ok(()) => terminate(&mut child, grace, run.id).await,
            Err(_) => {
                // Cancel channel gone without an explicit cancel: the backend
                // (and with it the session) is being torn down. Wait the child
                // out; kill_on_drop covers the case where we never get to.
                debug!(run_id = run.id, "cancel channel closed; waiting out the child");
                match child.wait().await {
                    Ok(status) => end_from_status_code(status.code()),
                    Err(_) => RunEnd::Signaled,
                }
            }
        },
    };

    send_finished(&session_tx, &run, started_at, end).await;
}

/// Build the OS command for an action: inherited stdio, inherited cwd and
/// environment unless the action overrides them, own process group on Unix.
fn build_command(action: &Action) -> Command {
    let mut std_cmd = std::process::Command::new(&action.program);
    std_cmd.args(&action.args);
    if let Some(dir) = &action.cwd {
        std_cmd.current_dir(dir);
    }
    for (key, value) in &action.env {
        std_cmd.env(key, value);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Group leader, so the termination signal reaches the child's own
        // children (sh -c wrappers, test runners forking workers).
        std_cmd.process_group(0);
    }

    let mut cmd = Command::from(std_cmd);
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    cmd
}

/// Cancellation state machine for a live child.
///
/// Sends the graceful termination signal, waits out the grace period, and
/// force-kills if the child has not exited by then. Returns only once the
/// child has been reaped.
async fn terminate(child: &mut Child, grace: Duration, run_id: RunId) -> RunEnd {
    // Running -> SignalSent
    signal_terminate(child, run_id);

    match timeout(grace, child.wait()).await {
        // SignalSent -> Exited
        Ok(Ok(status)) => {
            info!(
                run_id,
                exit_code = status.code(),
                "run process exited after termination signal"
            );
            RunEnd::Signaled
        }
        Ok(Err(err)) => {
            warn!(run_id, error = %err, "failed waiting for signalled process");
            RunEnd::Signaled
        }
        // SignalSent -> ForceKilled
        Err(_) => {
            warn!(
                run_id,
                grace_ms = grace.as_millis() as u64,
                "grace period expired; force-killing run process"
            );
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                // The direct child may have stubborn descendants; the forced
                // kill goes to the whole group too.
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            if let Err(err) = child.kill().await {
                warn!(run_id, error = %err, "failed to force-kill run process");
            }
            RunEnd::Signaled
        }
    }
}

#[cfg(unix)]
fn signal_terminate(child: &mut Child, run_id: RunId) {
    match child.id() {
        Some(pid) => {
            info!(run_id, pid, "sending SIGTERM to run process group");
            // Negative pid addresses the whole process group.
            unsafe {
                libc::kill(-(pid as i32), libc::SIGTERM);
            }
        }
        None => {
            // Already reaped; the pending wait() will return immediately.
            debug!(run_id, "termination requested for already-exited process");
        }
    }
}

#[cfg(not(unix))]
fn signal_terminate(child: &mut Child, run_id: RunId) {
    // No process groups or SIGTERM here; the grace period still applies
    // between this kill request and the forced one, harmlessly.
    info!(run_id, "killing run process");
    let _ = child.start_kill();
}

fn end_from_status_code(code: Option<i32>) -> RunEnd {
    match code {
        Some(code) => RunEnd::Exited(code),
        // No exit code means the process was taken down by a signal.
        None => RunEnd::Signaled,
    }
}

async fn send_finished(
    session_tx: &mpsc::Sender<SessionEvent>,
    run: &ScheduledRun,
    started_at: SystemTime,
    end: RunEnd,
) {
    let event = SessionEvent::RunFinished {
        id: run.id,
        started_at,
        end,
    };
    if session_tx.send(event).await.is_err() {
        debug!(run_id = run.id, "session gone before run completion was reported");
    }
}

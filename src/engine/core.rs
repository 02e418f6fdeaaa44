// src/engine/core.rs

//! Pure core session state machine.
//!
//! This module contains a synchronous, deterministic core that consumes
//! [`SessionEvent`]s and produces:
//! - an updated run state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - starting and cancelling processes via the runner backend
//! - reporting outcomes to the developer
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes. It is also where the session's one
//! hard invariant lives: at most one run is live at any instant, and a new
//! run is never started before the previous one has been reaped.

use crate::engine::{RunEnd, RunId, RunRecord, ScheduledRun, SessionEvent};
use crate::types::Action;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand this run to the runner backend.
    StartRun(ScheduledRun),
    /// Terminate the live run's process (signal, then force-kill on timeout).
    CancelRun(RunId),
    /// A run completed uncancelled: surface its record.
    ReportRun(RunRecord),
    /// A run was superseded before completing: no record, but say so.
    ReportSuperseded { id: RunId },
}

/// Decision returned by the core after handling a single `SessionEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    fn exit(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: false,
        }
    }
}

/// Lifecycle of the session's single run slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    /// No process live; the next trigger starts one immediately.
    Idle,
    /// A process is live (or being spawned).
    Running { id: RunId },
    /// The live process has been told to terminate; once it is reaped, a new
    /// run starts with the latest state of the tree.
    Cancelling { id: RunId },
    /// Shutdown was requested while a process was live; once it is reaped,
    /// the session exits.
    ShuttingDown { id: RunId },
}

/// Pure core session state.
///
/// Owns the action template and the run slot. It has **no** channels, no
/// Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreSession {
    action: Action,
    state: RunState,
    next_run_id: RunId,
}

impl CoreSession {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            state: RunState::Idle,
            next_run_id: 1,
        }
    }

    /// Whether no run is live (for tests).
    pub fn is_idle(&self) -> bool {
        self.state == RunState::Idle
    }

    /// The live run's id, if any (for tests).
    pub fn live_run_id(&self) -> Option<RunId> {
        match self.state {
            RunState::Idle => None,
            RunState::Running { id }
            | RunState::Cancelling { id }
            | RunState::ShuttingDown { id } => Some(id),
        }
    }

    /// Handle a single session event, updating state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: SessionEvent) -> CoreStep {
        match event {
            SessionEvent::TriggerFired => self.handle_trigger(),
            SessionEvent::RunFinished {
                id,
                started_at,
                end,
            } => self.handle_run_finished(id, started_at, end),
            SessionEvent::ShutdownRequested => self.handle_shutdown(),
        }
    }

    fn handle_trigger(&mut self) -> CoreStep {
        match self.state {
            RunState::Idle => {
                let run = self.schedule_next();
                CoreStep::running(vec![CoreCommand::StartRun(run)])
            }
            RunState::Running { id } => {
                // Supersede: signal the live run; the replacement starts only
                // once it has been reaped.
                self.state = RunState::Cancelling { id };
                CoreStep::running(vec![CoreCommand::CancelRun(id)])
            }
            // Already cancelling towards a rerun; the rerun will pick up the
            // newest tree state anyway, so further triggers coalesce.
            RunState::Cancelling { .. } => CoreStep::running(Vec::new()),
            RunState::ShuttingDown { .. } => CoreStep::running(Vec::new()),
        }
    }

    fn handle_run_finished(
        &mut self,
        id: RunId,
        started_at: std::time::SystemTime,
        end: RunEnd,
    ) -> CoreStep {
        match self.state {
            RunState::Running { id: cur } if cur == id => {
                self.state = RunState::Idle;
                CoreStep::running(vec![CoreCommand::ReportRun(RunRecord {
                    id,
                    action: self.action.clone(),
                    started_at,
                    end,
                })])
            }
            RunState::Cancelling { id: cur } if cur == id => {
                let mut commands = vec![self.cancelled_run_report(id, started_at, end)];
                let run = self.schedule_next();
                commands.push(CoreCommand::StartRun(run));
                CoreStep::running(commands)
            }
            RunState::ShuttingDown { id: cur } if cur == id => {
                let report = self.cancelled_run_report(id, started_at, end);
                self.state = RunState::Idle;
                CoreStep::exit(vec![report])
            }
            // A completion for a run we no longer track. Nothing to do.
            _ => CoreStep::running(Vec::new()),
        }
    }

    /// Report for a run that was asked to terminate. A signalled end is the
    /// supersession case: no record. Anything else (ran to completion just
    /// before the signal landed, or never spawned) is a real outcome.
    fn cancelled_run_report(
        &self,
        id: RunId,
        started_at: std::time::SystemTime,
        end: RunEnd,
    ) -> CoreCommand {
        if end == RunEnd::Signaled {
            CoreCommand::ReportSuperseded { id }
        } else {
            CoreCommand::ReportRun(RunRecord {
                id,
                action: self.action.clone(),
                started_at,
                end,
            })
        }
    }

    fn handle_shutdown(&mut self) -> CoreStep {
        match self.state {
            RunState::Idle => CoreStep::exit(Vec::new()),
            RunState::Running { id } => {
                self.state = RunState::ShuttingDown { id };
                CoreStep::running(vec![CoreCommand::CancelRun(id)])
            }
            RunState::Cancelling { id } => {
                // Signal already sent; just stop once it is reaped.
                self.state = RunState::ShuttingDown { id };
                CoreStep::running(Vec::new())
            }
            RunState::ShuttingDown { .. } => CoreStep::running(Vec::new()),
        }
    }

    fn schedule_next(&mut self) -> ScheduledRun {
        let id = self.next_run_id;
        self.next_run_id += 1;
        let run = ScheduledRun {
            id,
            action: self.action.clone(),
        };
        self.state = RunState::Running { id };
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn core() -> CoreSession {
        CoreSession::new(Action::new("echo").arg("build-ok"))
    }

    fn finished(id: RunId, end: RunEnd) -> SessionEvent {
        SessionEvent::RunFinished {
            id,
            started_at: SystemTime::UNIX_EPOCH,
            end,
        }
    }

    #[test]
    fn trigger_from_idle_starts_a_run() {
        let mut core = core();
        let step = core.step(SessionEvent::TriggerFired);

        assert!(step.keep_running);
        assert_eq!(step.commands.len(), 1);
        assert!(matches!(
            &step.commands[0],
            CoreCommand::StartRun(run) if run.id == 1
        ));
        assert_eq!(core.live_run_id(), Some(1));
    }

    #[test]
    fn completed_run_yields_a_record_with_its_exit_code() {
        let mut core = core();
        core.step(SessionEvent::TriggerFired);
        let step = core.step(finished(1, RunEnd::Exited(2)));

        assert!(step.keep_running);
        assert!(matches!(
            &step.commands[0],
            CoreCommand::ReportRun(record) if record.id == 1 && record.end == RunEnd::Exited(2)
        ));
        assert!(core.is_idle());
    }

    #[test]
    fn trigger_while_running_cancels_but_does_not_start_yet() {
        let mut core = core();
        core.step(SessionEvent::TriggerFired);
        let step = core.step(SessionEvent::TriggerFired);

        // Only the cancellation goes out: the next run must wait for the
        // previous one to be reaped.
        assert_eq!(step.commands.len(), 1);
        assert!(matches!(step.commands[0], CoreCommand::CancelRun(1)));
        assert_eq!(core.live_run_id(), Some(1));
    }

    #[test]
    fn superseded_run_yields_no_record_and_the_next_run_starts() {
        let mut core = core();
        core.step(SessionEvent::TriggerFired);
        core.step(SessionEvent::TriggerFired);
        let step = core.step(finished(1, RunEnd::Signaled));

        assert_eq!(step.commands.len(), 2);
        assert!(matches!(
            step.commands[0],
            CoreCommand::ReportSuperseded { id: 1 }
        ));
        assert!(matches!(
            &step.commands[1],
            CoreCommand::StartRun(run) if run.id == 2
        ));
        assert_eq!(core.live_run_id(), Some(2));
    }

    #[test]
    fn run_that_finished_before_the_signal_landed_keeps_its_record() {
        let mut core = core();
        core.step(SessionEvent::TriggerFired);
        core.step(SessionEvent::TriggerFired);
        let step = core.step(finished(1, RunEnd::Exited(0)));

        assert!(matches!(
            &step.commands[0],
            CoreCommand::ReportRun(record) if record.end == RunEnd::Exited(0)
        ));
        assert!(matches!(
            &step.commands[1],
            CoreCommand::StartRun(run) if run.id == 2
        ));
    }

    #[test]
    fn triggers_while_cancelling_coalesce() {
        let mut core = core();
        core.step(SessionEvent::TriggerFired);
        core.step(SessionEvent::TriggerFired);
        let step = core.step(SessionEvent::TriggerFired);
        assert!(step.commands.is_empty());

        // Still exactly one replacement run after the reap.
        let step = core.step(finished(1, RunEnd::Signaled));
        let starts = step
            .commands
            .iter()
            .filter(|c| matches!(c, CoreCommand::StartRun(_)))
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn spawn_failure_is_reported_and_the_session_stays_alive() {
        let mut core = core();
        core.step(SessionEvent::TriggerFired);
        let step = core.step(finished(
            1,
            RunEnd::SpawnFailed("no such binary".to_string()),
        ));

        assert!(step.keep_running);
        assert!(matches!(
            &step.commands[0],
            CoreCommand::ReportRun(record)
                if matches!(record.end, RunEnd::SpawnFailed(_))
        ));
        assert!(core.is_idle());

        // The loop keeps accepting triggers afterwards.
        let step = core.step(SessionEvent::TriggerFired);
        assert!(matches!(&step.commands[0], CoreCommand::StartRun(run) if run.id == 2));
    }

    #[test]
    fn shutdown_while_idle_exits_immediately() {
        let mut core = core();
        let step = core.step(SessionEvent::ShutdownRequested);
        assert!(!step.keep_running);
        assert!(step.commands.is_empty());
    }

    #[test]
    fn shutdown_while_running_cancels_then_exits_after_reap() {
        let mut core = core();
        core.step(SessionEvent::TriggerFired);

        let step = core.step(SessionEvent::ShutdownRequested);
        assert!(step.keep_running);
        assert!(matches!(step.commands[0], CoreCommand::CancelRun(1)));

        let step = core.step(finished(1, RunEnd::Signaled));
        assert!(!step.keep_running);
        assert!(matches!(
            step.commands[0],
            CoreCommand::ReportSuperseded { id: 1 }
        ));
    }

    #[test]
    fn shutdown_while_cancelling_waits_for_the_reap() {
        let mut core = core();
        core.step(SessionEvent::TriggerFired);
        core.step(SessionEvent::TriggerFired);

        let step = core.step(SessionEvent::ShutdownRequested);
        assert!(step.keep_running);
        assert!(step.commands.is_empty());

        // The reap now ends the session instead of starting the rerun.
        let step = core.step(finished(1, RunEnd::Signaled));
        assert!(!step.keep_running);
        let starts = step
            .commands
            .iter()
            .filter(|c| matches!(c, CoreCommand::StartRun(_)))
            .count();
        assert_eq!(starts, 0);
    }

    #[test]
    fn stale_completions_are_ignored() {
        let mut core = core();
        core.step(SessionEvent::TriggerFired);
        core.step(finished(1, RunEnd::Exited(0)));

        let step = core.step(finished(1, RunEnd::Exited(0)));
        assert!(step.commands.is_empty());
        assert!(step.keep_running);
        assert!(core.is_idle());
    }

    #[test]
    fn at_most_one_run_is_ever_live() {
        // Walk a busy sequence and check the invariant after every step: a
        // StartRun command only ever appears when the previous run has been
        // reaped in the same or an earlier step.
        let mut core = core();
        let mut live: Option<RunId> = None;

        let events = vec![
            SessionEvent::TriggerFired,
            SessionEvent::TriggerFired,
            SessionEvent::TriggerFired,
            finished(1, RunEnd::Signaled),
            finished(2, RunEnd::Exited(0)),
            SessionEvent::TriggerFired,
            finished(3, RunEnd::Exited(1)),
        ];

        for event in events {
            let reaped = matches!(&event, SessionEvent::RunFinished { id, .. } if Some(*id) == live);
            let step = core.step(event);
            if reaped {
                live = None;
            }
            for command in &step.commands {
                if let CoreCommand::StartRun(run) = command {
                    assert!(live.is_none(), "run {} started while {live:?} live", run.id);
                    live = Some(run.id);
                }
            }
        }
    }
}

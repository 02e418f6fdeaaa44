// src/engine/mod.rs

//! Session engine for devloop.
//!
//! This module ties together:
//! - the debounced trigger stream coming out of [`crate::watch`]
//! - the single-run lifecycle (at most one child process alive at a time)
//! - completion reporting and shutdown
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::time::SystemTime;

use crate::types::Action;

/// Identifier for one triggered execution within a session.
pub type RunId = u64;

/// A run the core has decided to start, handed to the runner backend.
#[derive(Debug, Clone)]
pub struct ScheduledRun {
    pub id: RunId,
    pub action: Action,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnd {
    /// The process exited on its own with this code.
    Exited(i32),
    /// The process was terminated by a signal (typically our cancellation).
    Signaled,
    /// The process could never be launched.
    SpawnFailed(String),
}

/// Outcome record of one executed, uncancelled run.
///
/// Superseded runs produce no record; the engine reports them separately.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: RunId,
    pub action: Action,
    pub started_at: SystemTime,
    pub end: RunEnd,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.end, RunEnd::Exited(0))
    }
}

/// Events flowing into the session runtime from the debouncer, the runner
/// backend, and the operator-interrupt handler.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The debouncer observed a quiet period after changes: run the action.
    TriggerFired,
    /// A run's process has been reaped (exited, was killed, or never spawned).
    RunFinished {
        id: RunId,
        started_at: SystemTime,
        end: RunEnd,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Options for the IO shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Clear the screen before each run. Cosmetic only.
    pub clear_screen: bool,
}

pub mod core;
pub mod runtime;

pub use self::core::{CoreCommand, CoreSession, CoreStep};
pub use self::runtime::Runtime;

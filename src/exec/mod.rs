// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the configured action as a
//! child process, using `tokio::process::Command`, and reporting back to the
//! session runtime via `SessionEvent`s.
//!
//! - [`backend`] provides the `RunnerBackend` trait and the concrete
//!   `ProcessRunner` the runtime uses in production, and which tests can
//!   replace with a fake implementation.
//! - [`process`] handles an individual run's process lifecycle, including
//!   graceful-then-forced termination when the run is superseded.

pub mod backend;
pub mod process;

pub use backend::{ProcessRunner, RunnerBackend};
pub use process::run_process;

// src/errors.rs

//! Crate-wide error type and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevloopError {
    /// A watch target could not be registered at startup. Fatal: the tool
    /// cannot do its job without its watch set.
    #[error("failed to set up watches: {0}")]
    WatchSetup(String),

    /// The watcher's event stream was consumed after `stop()`.
    #[error("watcher is stopped: {0}")]
    WatcherClosed(String),

    /// The action command could not be launched. Non-fatal: reported per run,
    /// the watch loop keeps going.
    #[error("failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("filesystem notification error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevloopError>;

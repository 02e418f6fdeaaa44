// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Registering OS-level watches (`notify`) for the session's watch set,
//!   recursively for directories, including directories created later.
//! - Turning raw notification events into an ordered `ChangeEvent` stream.
//! - Filtering out paths the session ignores (build output, VCS metadata).
//! - Debouncing bursts of changes into single trigger pulses.
//!
//! It does **not** know about processes or run outcomes; it only turns
//! filesystem activity into triggers for the engine.

pub mod debounce;
pub mod filter;
pub mod watcher;

pub use debounce::{spawn_debouncer, DebounceWindow};
pub use filter::PathFilter;
pub use watcher::{ChangeEvent, ChangeKind, FsWatcher, WatchSet};

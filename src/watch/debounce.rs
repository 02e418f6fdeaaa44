// src/watch/debounce.rs

//! Burst debouncing: collapse a flurry of change events into one trigger.
//!
//! The window logic lives in [`DebounceWindow`], a pure state machine with an
//! explicit clock so it can be tested without tokio or real time. The async
//! pump in [`spawn_debouncer`] drives it from the watcher's change stream and
//! emits `SessionEvent::TriggerFired` into the runtime.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::engine::SessionEvent;
use crate::watch::watcher::ChangeEvent;

/// Sliding debounce window.
///
/// Each observed event (re)arms a deadline at `now + window`; the window fires
/// once the deadline passes with no further events. A save-all touching twenty
/// files therefore yields one trigger, fired `window` after the last write.
#[derive(Debug, Clone)]
pub struct DebounceWindow {
    window: Duration,
    deadline: Option<Instant>,
}

impl DebounceWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Record an event at `now`, opening the window or sliding it forward.
    pub fn observe(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    /// The instant the pending window elapses, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// If the pending window has elapsed by `now`, close it and report that a
    /// trigger is due. At most one trigger per armed window.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Spawn the debouncer pump: consume the change stream, apply the sliding
/// window, and send one `TriggerFired` per quiet period.
///
/// The pump exits when the change stream ends (watcher stopped) or the
/// session channel closes; a window still pending at stream end is discarded,
/// so no trigger is ever produced after stop.
pub fn spawn_debouncer(
    mut changes: mpsc::UnboundedReceiver<ChangeEvent>,
    window: Duration,
    session_tx: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut state = DebounceWindow::new(window);
        loop {
            match state.deadline() {
                // No window open: block until something changes.
                None => match changes.recv().await {
                    Some(change) => {
                        debug!(
                            path = %change.path.display(),
                            kind = ?change.kind,
                            "change observed; opening debounce window"
                        );
                        state.observe(Instant::now());
                    }
                    None => break,
                },
                // Window open: race further changes against the deadline.
                Some(deadline) => tokio::select! {
                    change = changes.recv() => match change {
                        Some(change) => {
                            debug!(
                                path = %change.path.display(),
                                kind = ?change.kind,
                                "change observed; sliding debounce window"
                            );
                            state.observe(Instant::now());
                        }
                        None => break,
                    },
                    _ = sleep_until(deadline) => {
                        if state.fire_if_due(Instant::now()) {
                            debug!("debounce window elapsed; firing trigger");
                            if session_tx.send(SessionEvent::TriggerFired).await.is_err() {
                                break;
                            }
                        }
                    }
                },
            }
        }
        debug!("debouncer finished");
    })
}

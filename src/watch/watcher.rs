// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{DevloopError, Result};
use crate::watch::filter::PathFilter;

/// The set of filesystem paths monitored for one watch session.
///
/// Immutable for the lifetime of the session. Every entry must exist when the
/// set is built; an entry that vanishes later simply stops producing events.
#[derive(Debug, Clone)]
pub struct WatchSet {
    entries: Vec<PathBuf>,
}

impl WatchSet {
    /// Validate and build a watch set. Fails with `WatchSetup` if the set is
    /// empty or any entry does not exist.
    pub fn new(entries: Vec<PathBuf>) -> Result<Self> {
        if entries.is_empty() {
            return Err(DevloopError::WatchSetup(
                "no watch targets given".to_string(),
            ));
        }
        for entry in &entries {
            if !entry.exists() {
                return Err(DevloopError::WatchSetup(format!(
                    "watch target does not exist: {}",
                    entry.display()
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }
}

/// Kind of filesystem mutation observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

/// One observed filesystem mutation, as delivered to the debouncer.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub observed_at: Instant,
}

/// A running filesystem watcher.
///
/// Owns the underlying `RecommendedWatcher` (shared with the forward loop so
/// newly created directories can be registered) and the consumer end of the
/// change stream. Dropping or stopping it releases all OS watch handles and
/// terminates the stream.
pub struct FsWatcher {
    inner: Arc<Mutex<Option<RecommendedWatcher>>>,
    events: Option<mpsc::UnboundedReceiver<ChangeEvent>>,
    stopped: bool,
}

impl std::fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWatcher")
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl FsWatcher {
    /// Register watches for every entry in `watch_set` and start delivering
    /// change events. Directory entries are watched recursively; watches for
    /// directories created later are established as their creation events
    /// arrive, so changes inside a fresh subtree are not missed.
    ///
    /// Fails with `WatchSetup` if any entry cannot be watched (permissions,
    /// watch limit, vanished since validation).
    pub fn spawn(watch_set: &WatchSet, filter: PathFilter) -> Result<FsWatcher> {
        // Canonicalize once so incoming event paths (which some backends
        // deliver canonicalized) relativize cleanly. Best effort.
        let roots: Vec<PathBuf> = watch_set
            .entries()
            .iter()
            .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
            .collect();

        // Channel from the blocking notify callback into the async world.
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();

        // Closure called synchronously by notify whenever an event arrives.
        // Transient per-event errors are reported and skipped; the stream
        // keeps going.
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Err(err) = raw_tx.send(event) {
                        // We can't log via tracing here easily, so fall back
                        // to stderr.
                        eprintln!("devloop: failed to forward notify event: {err}");
                    }
                }
                Err(err) => {
                    eprintln!("devloop: file watch error: {err}");
                }
            },
            Config::default(),
        )?;

        for root in &roots {
            let mode = if root.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(root, mode).map_err(|err| {
                DevloopError::WatchSetup(format!(
                    "cannot watch {}: {err}",
                    root.display()
                ))
            })?;
            debug!(path = %root.display(), ?mode, "watch registered");
        }

        info!(targets = roots.len(), "file watcher started");

        let inner = Arc::new(Mutex::new(Some(watcher)));
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChangeEvent>();

        // Async forward loop: consumes raw notify events, registers watches
        // for newly created directories, filters ignored paths, and emits
        // `ChangeEvent`s in delivery order. Exits when the notify callback's
        // sender is dropped, i.e. when the watcher itself is dropped.
        let loop_inner = Arc::clone(&inner);
        let loop_roots = roots;
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                debug!(?event, "received notify event");

                let Some(kind) = map_event_kind(&event.kind) else {
                    continue;
                };

                for path in event.paths {
                    let rel = relative_str(&loop_roots, &path);
                    if let Some(rel) = &rel {
                        if filter.is_ignored(rel) {
                            debug!(path = %rel, "change ignored by filter");
                            continue;
                        }
                    } else {
                        // Not under any root (mount points, symlink games).
                        // Forwarded unfiltered rather than dropped.
                        debug!(path = %path.display(), "change outside watch roots");
                    }

                    if kind == ChangeKind::Created && path.is_dir() {
                        register_new_subtree(&loop_inner, &path);
                    }

                    let change = ChangeEvent {
                        path,
                        kind,
                        observed_at: Instant::now(),
                    };
                    if event_tx.send(change).is_err() {
                        debug!("change consumer gone; watcher forward loop exiting");
                        return;
                    }
                }
            }
            debug!("watcher forward loop finished");
        });

        Ok(FsWatcher {
            inner,
            events: Some(event_rx),
            stopped: false,
        })
    }

    /// Take the change event stream. Can be taken once; fails with
    /// `WatcherClosed` after `stop()` or a second take.
    pub fn events(&mut self) -> Result<mpsc::UnboundedReceiver<ChangeEvent>> {
        if self.stopped {
            return Err(DevloopError::WatcherClosed(
                "event stream consumed after stop".to_string(),
            ));
        }
        self.events.take().ok_or_else(|| {
            DevloopError::WatcherClosed("event stream already taken".to_string())
        })
    }

    /// Stop watching: release all OS watch handles and terminate the event
    /// stream. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        // Dropping the RecommendedWatcher tears down its OS watches and its
        // callback, which closes the raw channel and in turn ends the forward
        // loop and the consumer stream.
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let _ = guard.take();
        info!("file watcher stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Register a recursive watch for a directory that appeared after startup.
///
/// Worklist form: creation events for nested fresh directories each arrive on
/// their own and are registered as they do, so no recursion happens here.
/// Failures are transient per-event errors: logged and skipped.
fn register_new_subtree(inner: &Arc<Mutex<Option<RecommendedWatcher>>>, dir: &Path) {
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut guard = match inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(watcher) = guard.as_mut() else {
            // Stopped concurrently; nothing to register.
            return;
        };
        match watcher.watch(&dir, RecursiveMode::Recursive) {
            Ok(()) => debug!(path = %dir.display(), "new directory registered"),
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to watch new directory");
            }
        }
    }
}

/// Map a notify event kind onto the change kinds the loop cares about.
///
/// `Access` is noise for a rebuild loop. `Any` comes from fallback backends
/// that can't classify; treat it as a modification since over-triggering is
/// safe and missing a change is not.
fn map_event_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Any => Some(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

/// Convert a path into a string relative to the first root containing it,
/// with forward slashes. Returns `None` if no root contains the path.
fn relative_str(roots: &[PathBuf], path: &Path) -> Option<String> {
    for root in roots {
        if let Ok(rel) = path.strip_prefix(root) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, RemoveKind};

    #[test]
    fn event_kinds_map_to_change_kinds() {
        assert_eq!(
            map_event_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            map_event_kind(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Removed)
        );
        assert_eq!(
            map_event_kind(&EventKind::Modify(ModifyKind::Name(
                notify::event::RenameMode::Any
            ))),
            Some(ChangeKind::Renamed)
        );
        assert_eq!(map_event_kind(&EventKind::Any), Some(ChangeKind::Modified));
        assert_eq!(
            map_event_kind(&EventKind::Access(AccessKind::Any)),
            None
        );
    }

    #[test]
    fn relative_str_uses_first_containing_root() {
        let roots = vec![PathBuf::from("/a/b"), PathBuf::from("/a")];
        assert_eq!(
            relative_str(&roots, Path::new("/a/b/c.rs")),
            Some("c.rs".to_string())
        );
        assert_eq!(
            relative_str(&roots, Path::new("/a/x.rs")),
            Some("x.rs".to_string())
        );
        assert_eq!(relative_str(&roots, Path::new("/elsewhere")), None);
    }

    #[test]
    fn watch_set_rejects_empty_and_missing() {
        assert!(WatchSet::new(vec![]).is_err());
        assert!(
            WatchSet::new(vec![PathBuf::from("/definitely/not/here/devloop")])
                .is_err()
        );
    }
}

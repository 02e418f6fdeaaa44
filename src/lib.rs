// src/lib.rs

pub mod cli;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;
pub mod watch;

use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::engine::{CoreSession, Runtime, SessionEvent, SessionOptions};
use crate::exec::ProcessRunner;
use crate::watch::{spawn_debouncer, FsWatcher, PathFilter, WatchSet};

/// High-level entry point used by `main.rs`.
///
/// This wires together one watch session:
/// - watch set and ignore filter from the resolved arguments
/// - filesystem watcher -> debouncer -> session runtime
/// - process runner backend
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let watch_set = WatchSet::new(args.watch_paths())?;
    let action = args.action()?;
    let filter = PathFilter::new(&args.ignore, !args.no_default_ignore)?;

    info!(
        targets = ?watch_set.entries(),
        command = %action,
        debounce_ms = args.debounce_ms,
        "devloop starting"
    );

    // Session event channel: debouncer, runner, and Ctrl-C all feed into it.
    let (session_tx, session_rx) = mpsc::channel::<SessionEvent>(64);

    let mut watcher = FsWatcher::spawn(&watch_set, filter)?;
    let changes = watcher.events()?;

    spawn_debouncer(
        changes,
        Duration::from_millis(args.debounce_ms),
        session_tx.clone(),
    );

    // Ctrl-C -> graceful shutdown.
    {
        let tx = session_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(SessionEvent::ShutdownRequested).await;
        });
    }

    // First run up front, so the developer sees a build before touching
    // anything.
    if !args.postpone {
        debug!("seeding initial run");
        session_tx.send(SessionEvent::TriggerFired).await?;
    }

    let core = CoreSession::new(action);
    let backend = ProcessRunner::new(session_tx.clone(), Duration::from_millis(args.grace_ms));
    let options = SessionOptions {
        clear_screen: args.clear,
    };

    let runtime = Runtime::new(core, session_rx, backend, options);
    let result = runtime.run().await;

    // Release OS watch handles before reporting the session result.
    watcher.stop();

    result?;
    Ok(())
}

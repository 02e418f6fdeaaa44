//! Small filesystem helpers for watch tests.

use std::path::{Path, PathBuf};

/// Write `contents` to `path`, creating parent directories as needed.
pub fn write_file(path: impl AsRef<Path>, contents: &str) -> PathBuf {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, contents).expect("write file");
    path.to_path_buf()
}

/// Poll `predicate` every 10ms until it returns true or `timeout_ms` elapses.
pub async fn wait_until<F>(timeout_ms: u64, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline =
        tokio::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    loop {
        if predicate() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within {timeout_ms}ms");
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Shared stop signal. Cloning hands out another handle to the same flag,
/// so a signal handler and any number of workers can observe one stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    stopped: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; safe from a signal handler.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Files currently being written, with the size each one should reach.
/// Transfers register before streaming and deregister on a terminal result;
/// a cancelled transfer stays registered so `cleanup` can judge the partial.
#[derive(Debug, Clone, Default)]
pub struct InflightTracker {
    files: Arc<Mutex<HashMap<PathBuf, u64>>>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, path: &Path, expected_bytes: u64) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.to_path_buf(), expected_bytes);
        }
    }

    pub fn untrack(&self, path: &Path) {
        if let Ok(mut files) = self.files.lock() {
            files.remove(path);
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.files.lock().map(|files| files.len()).unwrap_or(0)
    }

    /// Deletes every tracked file smaller than its expected size and returns
    /// how many were removed. Expected size 0 means the size was never
    /// learned; those files are left alone.
    pub fn cleanup(&self) -> usize {
        let entries: Vec<(PathBuf, u64)> = match self.files.lock() {
            Ok(mut files) => files.drain().collect(),
            Err(_) => return 0,
        };
        let mut removed = 0usize;
        for (path, expected) in entries {
            if expected == 0 {
                continue;
            }
            let actual = match std::fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(_) => continue,
            };
            if actual < expected {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), actual, expected, "removed partial file");
                        removed += 1;
                    }
                    Err(err) => {
                        warn!(path = %path.display(), %err, "failed to remove partial file");
                    }
                }
            }
        }
        removed
    }
}

/// Sleeps in slices and bails once stopped, so waits between retries never
/// stall shutdown.
pub(crate) fn sleep_cancellable(cancel: &CancelToken, duration: Duration) {
    let step = Duration::from_millis(50);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if cancel.is_stopped() {
            return;
        }
        let nap = remaining.min(step);
        thread::sleep(nap);
        remaining = remaining.saturating_sub(nap);
    }
}

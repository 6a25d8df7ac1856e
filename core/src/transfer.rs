use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cancel::{sleep_cancellable, CancelToken, InflightTracker};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::net::{DownloadRequest, NetClient};
use crate::progress::ProgressAggregator;
use crate::task::DownloadTask;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Bytes this call streamed to disk, across all attempts.
    pub bytes_written: u64,
    /// Resolved total size; equals the file size on disk.
    pub final_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed(TransferResult),
    Cancelled,
}

enum AttemptOutcome {
    Done { final_size: u64 },
    Cancelled,
}

/// Seam between the scheduler and the transfer layer, so batches can be
/// driven by scripted fetchers in tests.
pub trait Fetcher: Send + Sync {
    /// Downloads `task.url` to `task.dest_path`, resuming from whatever is
    /// already on disk. On success the file size equals the resolved total.
    fn fetch(&self, task: &DownloadTask, cancel: &CancelToken) -> CoreResult<TransferOutcome>;
}

/// One-file resumable download. Retry stays inside `fetch`; callers only
/// ever see the final outcome.
pub struct Transfer {
    net: Arc<dyn NetClient>,
    config: EngineConfig,
    auth: Option<(String, String)>,
    progress: ProgressAggregator,
    tracker: InflightTracker,
}

impl Transfer {
    pub fn new(
        net: Arc<dyn NetClient>,
        config: EngineConfig,
        auth: Option<(String, String)>,
        progress: ProgressAggregator,
        tracker: InflightTracker,
    ) -> Self {
        Self {
            net,
            config,
            auth,
            progress,
            tracker,
        }
    }

    fn attempt_fetch(
        &self,
        task: &DownloadTask,
        cancel: &CancelToken,
        written: &mut u64,
    ) -> CoreResult<AttemptOutcome> {
        let dest = task.dest_path.as_path();
        let existing = match std::fs::metadata(dest) {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = DownloadRequest::new(task.url.clone());
        request.basic_auth = self.auth.clone();
        if existing > 0 {
            request.range_start = Some(existing);
            debug!(path = %dest.display(), offset = existing, "resuming download");
        }

        let resp = self.net.get_stream(&request)?;
        if resp.status_code >= 400 {
            return Err(CoreError::Network(format!(
                "http status {} for {}",
                resp.status_code, task.url
            )));
        }

        // A 200 answer to a ranged request means the server ignored the
        // offset; appending its body would corrupt the file.
        let resumed = existing > 0 && resp.status_code == 206;
        if existing > 0 && !resumed {
            info!(path = %dest.display(), "server ignored range request, restarting from zero");
        }

        let total = if resumed {
            resp.content_range_total
                .unwrap_or_else(|| resp.total_bytes.unwrap_or(0) + existing)
        } else {
            resp.total_bytes.unwrap_or(0)
        };
        if total > 0 {
            self.tracker.track(dest, total);
        }

        let mut file = if resumed {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(dest)
                .map_err(|err| CoreError::Io(err.to_string()))?;
            file.seek(SeekFrom::Start(existing))
                .map_err(|err| CoreError::Io(err.to_string()))?;
            file
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(dest)
                .map_err(|err| CoreError::Io(err.to_string()))?
        };

        let cadence = self.config.progress_update_chunks.max(1);
        let mut body = resp.body;
        let mut buffer = vec![0u8; self.config.chunk_size_bytes.max(1)];
        let mut downloaded = if resumed { existing } else { 0 };
        let mut unflushed = 0u64;
        let mut chunk_count = 0u32;

        loop {
            if cancel.is_stopped() {
                self.progress.update(task.id, downloaded, total);
                self.progress.advance_batch(unflushed);
                return Ok(AttemptOutcome::Cancelled);
            }
            let read = body
                .read(&mut buffer)
                .map_err(|err| CoreError::Network(err.to_string()))?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .map_err(|err| CoreError::Io(err.to_string()))?;
            downloaded += read as u64;
            *written += read as u64;
            unflushed += read as u64;
            chunk_count += 1;
            if chunk_count % cadence == 0 {
                self.progress.update(task.id, downloaded, total);
                self.progress.advance_batch(unflushed);
                unflushed = 0;
            }
        }

        self.progress.update(task.id, downloaded, total);
        self.progress.advance_batch(unflushed);

        // A clean EOF short of the announced size is a dropped connection;
        // the retry path resumes from the bytes already written.
        if total > 0 && downloaded < total {
            return Err(CoreError::Network(format!(
                "body ended early: {} of {} bytes for {}",
                downloaded, total, task.url
            )));
        }

        let final_size = if total > 0 { total } else { downloaded };
        Ok(AttemptOutcome::Done { final_size })
    }
}

impl Fetcher for Transfer {
    /// A cancelled transfer stays registered with the tracker so cleanup
    /// can weigh the partial file; success and failure deregister it.
    fn fetch(&self, task: &DownloadTask, cancel: &CancelToken) -> CoreResult<TransferOutcome> {
        let dest = task.dest_path.as_path();
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| CoreError::Io(format!("create {}: {}", parent.display(), err)))?;
        }
        self.tracker.track(dest, task.expected_bytes);

        let mut written = 0u64;
        let mut last_error: Option<CoreError> = None;
        for attempt in 0..=self.config.retry_count {
            if cancel.is_stopped() {
                return Ok(TransferOutcome::Cancelled);
            }
            match self.attempt_fetch(task, cancel, &mut written) {
                Ok(AttemptOutcome::Done { final_size }) => {
                    self.tracker.untrack(dest);
                    return Ok(TransferOutcome::Completed(TransferResult {
                        bytes_written: written,
                        final_size,
                    }));
                }
                Ok(AttemptOutcome::Cancelled) => {
                    debug!(url = %task.url, "transfer cancelled");
                    return Ok(TransferOutcome::Cancelled);
                }
                Err(err) => {
                    warn!(
                        url = %task.url,
                        attempt = attempt + 1,
                        tries = self.config.retry_count + 1,
                        %err,
                        "transfer attempt failed"
                    );
                    last_error = Some(err);
                    if attempt < self.config.retry_count {
                        sleep_cancellable(
                            cancel,
                            backoff_delay(self.config.retry_backoff, attempt),
                        );
                    }
                }
            }
        }
        self.tracker.untrack(dest);
        Err(last_error
            .unwrap_or_else(|| CoreError::Network(format!("failed to download {}", task.url))))
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt)
}

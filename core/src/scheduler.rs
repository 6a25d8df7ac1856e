use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::task::{DownloadTask, TaskStatus};
use crate::transfer::{Fetcher, TransferOutcome};

/// Final state of every task handed to `run_batch`, partitioned by outcome.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub completed: Vec<DownloadTask>,
    pub failed: Vec<DownloadTask>,
    pub canceled: Vec<DownloadTask>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.canceled.len()
    }
}

/// Fixed pool of download workers over a shared FIFO queue. Worker count is
/// the concurrency cap; tasks beyond it wait in the queue instead of getting
/// their own thread.
pub struct Scheduler {
    fetcher: Arc<dyn Fetcher>,
    config: EngineConfig,
}

impl Scheduler {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: EngineConfig) -> Self {
        Self { fetcher, config }
    }

    /// Runs one batch to completion (or cancellation). `on_complete` fires on
    /// this thread, in completion order, for every task that finished
    /// downloading. Once the token stops, workers quit between tasks and the
    /// drain is bounded; tasks never started come back as `Canceled`.
    pub fn run_batch(
        &self,
        tasks: Vec<DownloadTask>,
        cancel: &CancelToken,
        mut on_complete: impl FnMut(&DownloadTask),
    ) -> BatchResult {
        let queue: Arc<Mutex<VecDeque<DownloadTask>>> = Arc::new(Mutex::new(tasks.into()));
        let (tx, rx) = mpsc::channel::<DownloadTask>();
        let workers = self.config.concurrency.max(1);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let fetcher = Arc::clone(&self.fetcher);
            let cancel = cancel.clone();
            let tx = tx.clone();
            let handle = thread::spawn(move || {
                debug!(worker, "download worker started");
                loop {
                    if cancel.is_stopped() {
                        break;
                    }
                    let next = match queue.lock() {
                        Ok(mut queue) => queue.pop_front(),
                        Err(_) => None,
                    };
                    let mut task = match next {
                        Some(task) => task,
                        None => break,
                    };
                    task.status = TaskStatus::Active;
                    task.attempts += 1;
                    match fetcher.fetch(&task, &cancel) {
                        Ok(TransferOutcome::Completed(result)) => {
                            task.status = TaskStatus::Completed;
                            task.downloaded_bytes = result.final_size;
                            task.expected_bytes = result.final_size;
                            debug!(url = %task.url, bytes = result.final_size, "download complete");
                        }
                        Ok(TransferOutcome::Cancelled) => {
                            task.status = TaskStatus::Canceled;
                        }
                        Err(err) => {
                            task.status = TaskStatus::Failed;
                            task.error = Some(err.to_string());
                            warn!(url = %task.url, %err, "download failed");
                        }
                    }
                    if tx.send(task).is_err() {
                        break;
                    }
                }
                debug!(worker, "download worker exiting");
            });
            handles.push(handle);
        }
        drop(tx);

        let mut result = BatchResult::default();
        let drain_budget = self.config.drain_timeout_per_worker * workers as u32;
        let mut deadline: Option<Instant> = None;
        let mut timed_out = false;
        loop {
            if deadline.is_none() && cancel.is_stopped() {
                deadline = Some(Instant::now() + drain_budget);
            }
            match rx.recv_timeout(self.config.poll_interval) {
                Ok(task) => match task.status {
                    TaskStatus::Completed => {
                        on_complete(&task);
                        result.completed.push(task);
                    }
                    TaskStatus::Failed => result.failed.push(task),
                    _ => result.canceled.push(task),
                },
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            warn!("drain budget exhausted, abandoning unfinished workers");
                            timed_out = true;
                            break;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Ok(mut queue) = queue.lock() {
            for mut task in queue.drain(..) {
                task.status = TaskStatus::Canceled;
                result.canceled.push(task);
            }
        }

        // After a timed-out drain a worker may be wedged in a read; joining
        // it would hang shutdown, so only finished threads are reaped.
        for handle in handles {
            if !timed_out || handle.is_finished() {
                let _ = handle.join();
            }
        }
        result
    }
}

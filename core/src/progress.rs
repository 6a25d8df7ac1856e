use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::task::TaskId;

#[derive(Debug, Clone)]
struct TaskEntry {
    name: String,
    completed_bytes: u64,
    total_bytes: u64,
    done: bool,
    started: Instant,
}

#[derive(Debug)]
struct Inner {
    tasks: HashMap<TaskId, TaskEntry>,
    order: Vec<TaskId>,
    batch_completed: u64,
    batch_total: u64,
    batch_started: Instant,
}

#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub completed_bytes: u64,
    pub total_bytes: u64,
    pub throughput_bps: f64,
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub tasks: Vec<TaskSnapshot>,
    pub batch_completed: u64,
    pub batch_total: u64,
    pub throughput_bps: f64,
}

/// Byte counters for the running batch and its tasks. Every mutation takes
/// the one lock; throughput is derived from wall time at snapshot so the
/// numbers cannot drift.
#[derive(Clone)]
pub struct ProgressAggregator {
    inner: Arc<Mutex<Inner>>,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tasks: HashMap::new(),
                order: Vec::new(),
                batch_completed: 0,
                batch_total: 0,
                batch_started: Instant::now(),
            })),
        }
    }

    /// Resets the per-task table and batch counters for a new batch.
    pub fn start_batch(&self, batch_total: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.tasks.clear();
            inner.order.clear();
            inner.batch_completed = 0;
            inner.batch_total = batch_total;
            inner.batch_started = Instant::now();
        }
    }

    pub fn register(&self, id: TaskId, name: &str, total_bytes: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.order.push(id);
            inner.tasks.insert(
                id,
                TaskEntry {
                    name: name.to_string(),
                    completed_bytes: 0,
                    total_bytes,
                    done: false,
                    started: Instant::now(),
                },
            );
        }
    }

    /// Updates one task's counters. Unregistered ids are ignored; the batch
    /// may already have been reset under a late-reporting worker.
    pub fn update(&self, id: TaskId, completed_bytes: u64, total_bytes: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(entry) = inner.tasks.get_mut(&id) {
                entry.completed_bytes = completed_bytes;
                if total_bytes > 0 {
                    entry.total_bytes = total_bytes;
                }
            }
        }
    }

    pub fn advance_batch(&self, delta_bytes: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.batch_completed += delta_bytes;
        }
    }

    pub fn finish_task(&self, id: TaskId) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(entry) = inner.tasks.get_mut(&id) {
                entry.done = true;
            }
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => {
                return ProgressSnapshot {
                    tasks: Vec::new(),
                    batch_completed: 0,
                    batch_total: 0,
                    throughput_bps: 0.0,
                }
            }
        };
        let tasks = inner
            .order
            .iter()
            .filter_map(|id| {
                inner.tasks.get(id).map(|entry| TaskSnapshot {
                    id: *id,
                    name: entry.name.clone(),
                    completed_bytes: entry.completed_bytes,
                    total_bytes: entry.total_bytes,
                    throughput_bps: rate(entry.completed_bytes, entry.started),
                    done: entry.done,
                })
            })
            .collect();
        ProgressSnapshot {
            tasks,
            batch_completed: inner.batch_completed,
            batch_total: inner.batch_total,
            throughput_bps: rate(inner.batch_completed, inner.batch_started),
        }
    }
}

fn rate(completed_bytes: u64, started: Instant) -> f64 {
    let elapsed = started.elapsed().as_secs_f64();
    if elapsed > 0.0 {
        completed_bytes as f64 / elapsed
    } else {
        0.0
    }
}

pub mod archive;
pub mod cancel;
pub mod config;
pub mod discover;
pub mod engine;
pub mod error;
pub mod extract;
pub mod hash;
pub mod net;
pub mod parts;
pub mod paths;
pub mod progress;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod transfer;
pub mod upload;

pub use crate::cancel::CancelToken;
pub use crate::discover::SiteFormat;
pub use crate::engine::{DownloadEngine, RunOptions, RunSummary};
pub use crate::error::CoreError;
pub use crate::task::{DownloadTask, TaskId, TaskStatus};

use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "active" => Some(TaskStatus::Active),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "canceled" => Some(TaskStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub id: TaskId,
    pub url: String,
    pub dest_path: PathBuf,
    /// 0 until the size is known from a HEAD pass or response headers.
    pub expected_bytes: u64,
    pub downloaded_bytes: u64,
    pub attempts: u32,
    pub status: TaskStatus,
    pub error: Option<String>,
}

impl DownloadTask {
    pub fn new(url: String, dest_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            dest_path,
            expected_bytes: 0,
            downloaded_bytes: 0,
            attempts: 0,
            status: TaskStatus::Pending,
            error: None,
        }
    }
}

use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::error::{CoreError, CoreResult};

pub trait Uploader: Send + Sync {
    /// Mirrors `folder` to the remote under the bracketed group tag.
    fn upload(&self, folder: &Path, group: &str) -> CoreResult<()>;
}

/// Uploader backed by the `rclone` binary.
pub struct RcloneUploader {
    program: String,
    remote: String,
}

impl RcloneUploader {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            program: "rclone".to_string(),
            remote: remote.into(),
        }
    }

    pub fn with_program(program: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            remote: remote.into(),
        }
    }
}

impl Uploader for RcloneUploader {
    fn upload(&self, folder: &Path, group: &str) -> CoreResult<()> {
        let dest = format!("{}:[{}]/{}", self.remote, group, folder.display());
        info!(folder = %folder.display(), dest = %dest, "uploading folder");
        let output = Command::new(&self.program)
            .arg("copy")
            .arg(folder)
            .arg(&dest)
            .args([
                "--transfers",
                "10",
                "--checkers",
                "16",
                "--retries",
                "10",
                "--low-level-retries",
                "20",
                "--stats-one-line",
                "-P",
                "--stats",
                "2s",
            ])
            .output()
            .map_err(|err| CoreError::Upload(format!("run {}: {}", self.program, err)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Upload(format!(
                "rclone exited {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

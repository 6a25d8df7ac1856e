use std::path::Path;
use std::process::{Command, Output};

use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// What the archive tool said about one password. A rejection is data for
/// the candidate loop, not an error; only failing to run the tool is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Accepted,
    Rejected(String),
}

pub trait Archiver: Send + Sync {
    /// Integrity-tests `archive` with `password` without writing anything.
    fn test(&self, archive: &Path, password: &str) -> CoreResult<ArchiveOutcome>;
    /// Extracts `archive` into `outdir`, overwriting existing files.
    fn extract(&self, archive: &Path, password: &str, outdir: &Path)
        -> CoreResult<ArchiveOutcome>;
}

/// Archiver backed by the `unrar` binary. Pointed at the first volume of a
/// multi-volume set, the tool walks the remaining volumes itself.
pub struct UnrarArchiver {
    program: String,
}

impl Default for UnrarArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl UnrarArchiver {
    pub fn new() -> Self {
        Self {
            program: "unrar".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Archiver for UnrarArchiver {
    fn test(&self, archive: &Path, password: &str) -> CoreResult<ArchiveOutcome> {
        debug!(archive = %archive.display(), "testing archive password");
        let output = Command::new(&self.program)
            .arg("t")
            .arg(format!("-p{}", password))
            .arg("-idq")
            .arg(archive)
            .output()
            .map_err(|err| CoreError::Archive(format!("run {}: {}", self.program, err)))?;
        Ok(classify(&output))
    }

    fn extract(
        &self,
        archive: &Path,
        password: &str,
        outdir: &Path,
    ) -> CoreResult<ArchiveOutcome> {
        debug!(archive = %archive.display(), outdir = %outdir.display(), "extracting archive");
        let output = Command::new(&self.program)
            .arg("x")
            .arg("-y")
            .arg("-o+")
            .arg(format!("-p{}", password))
            .arg(archive)
            // trailing slash makes unrar treat the target as a directory
            .arg(format!("{}/", outdir.display()))
            .output()
            .map_err(|err| CoreError::Archive(format!("run {}: {}", self.program, err)))?;
        Ok(classify(&output))
    }
}

fn classify(output: &Output) -> ArchiveOutcome {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if output.status.success() {
        // unrar can exit 0 and still report a failed check in its output
        if looks_rejected(&stdout) || looks_rejected(&stderr) {
            return ArchiveOutcome::Rejected(detail(&stdout, &stderr, output));
        }
        return ArchiveOutcome::Accepted;
    }
    ArchiveOutcome::Rejected(detail(&stdout, &stderr, output))
}

fn looks_rejected(text: &str) -> bool {
    text.contains("Checksum error")
        || text.contains("wrong password")
        || text.contains("Wrong password")
        || text.contains("CRC failed")
        || text.contains("Corrupt file")
}

fn detail(stdout: &str, stderr: &str, output: &Output) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    format!("exit status {}", output.status)
}

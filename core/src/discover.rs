use std::fmt;
use std::process::Command;

use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Index-page flavors the pipeline knows how to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteFormat {
    DonwaGoindex,
    Maple3142GdIndex,
    AchrouGoindex,
    SpencerwoooOnedrive,
}

impl SiteFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteFormat::DonwaGoindex => "donwa/goindex",
            SiteFormat::Maple3142GdIndex => "maple3142/GDIndex",
            SiteFormat::AchrouGoindex => "achrou/goindex",
            SiteFormat::SpencerwoooOnedrive => "spencerwooo/onedrive",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "donwa/goindex" => Some(SiteFormat::DonwaGoindex),
            "maple3142/GDIndex" => Some(SiteFormat::Maple3142GdIndex),
            "achrou/goindex" => Some(SiteFormat::AchrouGoindex),
            "spencerwooo/onedrive" => Some(SiteFormat::SpencerwoooOnedrive),
            _ => None,
        }
    }

    pub fn all() -> [SiteFormat; 4] {
        [
            SiteFormat::DonwaGoindex,
            SiteFormat::Maple3142GdIndex,
            SiteFormat::AchrouGoindex,
            SiteFormat::SpencerwoooOnedrive,
        ]
    }
}

impl fmt::Display for SiteFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finds the download URLs behind an index page. May transiently return an
/// empty list; the caller retries.
pub trait LinkDiscovery: Send + Sync {
    fn discover(
        &self,
        page_url: &str,
        format: SiteFormat,
        use_auth: bool,
    ) -> CoreResult<Vec<String>>;
}

/// Shells out to a scraper command. The command is invoked with the page
/// URL and format tag appended, plus `--auth` when requested, and must
/// print one download URL per stdout line.
pub struct CommandDiscovery {
    command: String,
}

impl CommandDiscovery {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl LinkDiscovery for CommandDiscovery {
    fn discover(
        &self,
        page_url: &str,
        format: SiteFormat,
        use_auth: bool,
    ) -> CoreResult<Vec<String>> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| CoreError::Config("scraper command is empty".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(parts);
        cmd.arg(page_url).arg(format.as_str());
        if use_auth {
            cmd.arg("--auth");
        }

        let output = cmd
            .output()
            .map_err(|e| CoreError::Discovery(format!("failed to run scraper: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Discovery(format!(
                "scraper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let links: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        debug!(page_url, count = links.len(), "scraper returned links");
        Ok(links)
    }
}

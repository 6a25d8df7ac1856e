use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub concurrency: usize,
    pub chunk_size_bytes: usize,
    pub progress_update_chunks: u32,
    pub retry_count: u32,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
    pub drain_timeout_per_worker: Duration,
    pub discovery_retry_delay: Duration,
    pub user_agent: String,
    pub http_user: Option<String>,
    pub http_password: Option<String>,
    pub store_path: Option<PathBuf>,
    pub rclone_remote: String,
    pub scraper_command: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            chunk_size_bytes: 64 * 1024,
            progress_update_chunks: 16,
            retry_count: 3,
            retry_backoff: Duration::from_secs(1),
            poll_interval: Duration::from_millis(200),
            drain_timeout_per_worker: Duration::from_secs(3),
            discovery_retry_delay: Duration::from_secs(5),
            user_agent: "packfetch/0.1".to_string(),
            http_user: None,
            http_password: None,
            store_path: None,
            rclone_remote: "remote".to_string(),
            scraper_command: None,
        }
    }
}

impl EngineConfig {
    /// Default config overlaid with `PACKFETCH_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(user) = std::env::var("PACKFETCH_USER") {
            if !user.is_empty() {
                config.http_user = Some(user);
            }
        }
        if let Ok(pass) = std::env::var("PACKFETCH_PASSWORD") {
            if !pass.is_empty() {
                config.http_password = Some(pass);
            }
        }
        if let Ok(db) = std::env::var("PACKFETCH_DB") {
            if !db.is_empty() {
                config.store_path = Some(PathBuf::from(db));
            }
        }
        if let Ok(remote) = std::env::var("PACKFETCH_REMOTE") {
            if !remote.is_empty() {
                config.rclone_remote = remote;
            }
        }
        if let Ok(cmd) = std::env::var("PACKFETCH_SCRAPER") {
            if !cmd.is_empty() {
                config.scraper_command = Some(cmd);
            }
        }
        config
    }
}

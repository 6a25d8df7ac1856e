use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::archive::{Archiver, UnrarArchiver};
use crate::cancel::{sleep_cancellable, CancelToken, InflightTracker};
use crate::config::EngineConfig;
use crate::discover::{CommandDiscovery, LinkDiscovery, SiteFormat};
use crate::error::{CoreError, CoreResult};
use crate::extract::{ExtractOutcome, ExtractionEngine};
use crate::net::{DownloadRequest, NetClient, ReqwestNetClient};
use crate::parts::PartGroupTable;
use crate::paths::{filename_from_url, folder_from_page_url};
use crate::progress::ProgressAggregator;
use crate::scheduler::Scheduler;
use crate::storage::{MemoryStore, PasswordStore};
use crate::task::DownloadTask;
use crate::transfer::{Fetcher, Transfer};
use crate::upload::{RcloneUploader, Uploader};

const DEFAULT_GROUP: &str = "TK";

/// Everything one invocation asks for, as parsed from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub page_url: String,
    pub site_format: SiteFormat,
    pub use_auth: bool,
    pub delete_after: bool,
    pub upload: bool,
    pub group_name: Option<String>,
    pub files_limit: Option<usize>,
    /// 1-based inclusive index range over the discovered list.
    pub filter: Option<(usize, usize)>,
    pub base_folder: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub canceled: usize,
    pub bytes_downloaded: u64,
    pub archives_extracted: usize,
    pub archives_without_password: usize,
    pub partials_removed: usize,
    pub interrupted: bool,
}

/// Batch driver: discovery, slicing, scheduling, extraction routing and
/// upload for one page URL. Collaborators default to the production
/// implementations; builders swap them out.
pub struct DownloadEngine {
    pub config: EngineConfig,
    net: Arc<dyn NetClient>,
    discovery: Arc<dyn LinkDiscovery>,
    archiver: Arc<dyn Archiver>,
    uploader: Arc<dyn Uploader>,
    store: Arc<Mutex<Box<dyn PasswordStore>>>,
    progress: ProgressAggregator,
    tracker: InflightTracker,
}

impl DownloadEngine {
    pub fn new(config: EngineConfig) -> Self {
        let net = ReqwestNetClient::new(&config.user_agent)
            .unwrap_or_else(|_| ReqwestNetClient::new("packfetch/0.1").expect("net client"));
        let discovery = CommandDiscovery::new(config.scraper_command.clone().unwrap_or_default());
        let uploader = RcloneUploader::new(config.rclone_remote.clone());
        Self {
            config,
            net: Arc::new(net),
            discovery: Arc::new(discovery),
            archiver: Arc::new(UnrarArchiver::new()),
            uploader: Arc::new(uploader),
            store: Arc::new(Mutex::new(Box::new(MemoryStore::default()))),
            progress: ProgressAggregator::new(),
            tracker: InflightTracker::new(),
        }
    }

    pub fn with_net(mut self, net: Arc<dyn NetClient>) -> Self {
        self.net = net;
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn LinkDiscovery>) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_store(mut self, store: Box<dyn PasswordStore>) -> Self {
        self.store = Arc::new(Mutex::new(store));
        self
    }

    /// Handle for a display loop; snapshots reflect the running batch.
    pub fn progress(&self) -> ProgressAggregator {
        self.progress.clone()
    }

    pub fn tracker(&self) -> InflightTracker {
        self.tracker.clone()
    }

    /// Runs the whole job: discover, slice, download batch by batch, extract
    /// archives, upload. Stopping the token at any point drains what is in
    /// flight, removes incomplete partials and returns the summary so far.
    pub fn run(&self, opts: &RunOptions, cancel: &CancelToken) -> CoreResult<RunSummary> {
        let mut summary = RunSummary::default();
        info!(url = %opts.page_url, format = %opts.site_format, "starting run");

        let mut links = self.discover_links(opts, cancel)?;
        summary.discovered = links.len();
        if !links.is_empty() {
            info!(count = links.len(), "discovery finished");
        }
        if let Some((start, end)) = opts.filter {
            links = apply_filter_range(links, start, end);
            info!(start, end, remaining = links.len(), "applied index filter");
        }

        if !links.is_empty() && !cancel.is_stopped() {
            let folder = folder_from_page_url(&opts.page_url, opts.site_format)?;
            let base_folder = match &opts.base_folder {
                Some(base) => base.join(folder),
                None => folder,
            };
            fs::create_dir_all(&base_folder).map_err(|err| {
                CoreError::Io(format!("create {}: {}", base_folder.display(), err))
            })?;

            let auth = if opts.use_auth {
                self.config
                    .http_user
                    .clone()
                    .zip(self.config.http_password.clone())
            } else {
                None
            };
            let transfer: Arc<dyn Fetcher> = Arc::new(Transfer::new(
                Arc::clone(&self.net),
                self.config.clone(),
                auth.clone(),
                self.progress.clone(),
                self.tracker.clone(),
            ));
            let scheduler = Scheduler::new(transfer, self.config.clone());
            let extraction =
                ExtractionEngine::new(Arc::clone(&self.archiver), Arc::clone(&self.store));

            while !links.is_empty() {
                if cancel.is_stopped() {
                    break;
                }
                let batch: Vec<String> = match opts.files_limit {
                    Some(limit) if limit > 0 && limit < links.len() => {
                        links.drain(..limit).collect()
                    }
                    _ => std::mem::take(&mut links),
                };

                let (tasks, batch_total) = self.build_batch_tasks(&batch, &base_folder, &auth);
                self.progress.start_batch(batch_total);
                for task in &tasks {
                    let name = task
                        .dest_path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .unwrap_or_default();
                    self.progress.register(task.id, name, task.expected_bytes);
                }
                info!(files = tasks.len(), bytes = batch_total, "starting batch");

                let parts = PartGroupTable::new();
                let result = scheduler.run_batch(tasks, cancel, |task| {
                    self.progress.finish_task(task.id);
                    let filename = task
                        .dest_path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .unwrap_or_default()
                        .to_string();
                    if parts.record(&filename, &task.dest_path) {
                        debug!(filename = %filename, "collected multipart volume");
                        return;
                    }
                    if filename.to_ascii_lowercase().ends_with(".rar") && !cancel.is_stopped() {
                        let volumes = [task.dest_path.clone()];
                        self.extract_archive(
                            &extraction,
                            &task.dest_path,
                            &base_folder,
                            &volumes,
                            opts.delete_after,
                            &mut summary,
                        );
                    }
                });

                summary.downloaded += result.completed.len();
                summary.failed += result.failed.len();
                summary.canceled += result.canceled.len();
                summary.bytes_downloaded += result
                    .completed
                    .iter()
                    .map(|task| task.downloaded_bytes)
                    .sum::<u64>();
                for task in result.failed.iter().chain(result.canceled.iter()) {
                    self.progress.finish_task(task.id);
                }

                // multi-volume sets wait for the whole batch; later volumes
                // may still be downloading when volume 1 lands
                for group in parts.drain() {
                    if cancel.is_stopped() {
                        break;
                    }
                    let volumes: Vec<PathBuf> = group.volumes.values().cloned().collect();
                    match group.first_volume() {
                        Some(first) => self.extract_archive(
                            &extraction,
                            first,
                            &base_folder,
                            &volumes,
                            opts.delete_after,
                            &mut summary,
                        ),
                        None => {
                            warn!(stem = %group.stem, "multipart group missing volume 1, skipping")
                        }
                    }
                }

                if opts.upload && !cancel.is_stopped() {
                    let group = opts.group_name.as_deref().unwrap_or(DEFAULT_GROUP);
                    self.uploader.upload(&base_folder, group)?;
                }
            }
        }

        summary.interrupted = cancel.is_stopped();
        summary.partials_removed = self.tracker.cleanup();
        info!(
            downloaded = summary.downloaded,
            failed = summary.failed,
            canceled = summary.canceled,
            extracted = summary.archives_extracted,
            interrupted = summary.interrupted,
            "run finished"
        );
        Ok(summary)
    }

    fn discover_links(&self, opts: &RunOptions, cancel: &CancelToken) -> CoreResult<Vec<String>> {
        loop {
            if cancel.is_stopped() {
                return Ok(Vec::new());
            }
            let links = self
                .discovery
                .discover(&opts.page_url, opts.site_format, opts.use_auth)?;
            if !links.is_empty() {
                return Ok(links);
            }
            info!(
                url = %opts.page_url,
                delay_secs = self.config.discovery_retry_delay.as_secs(),
                "no files listed yet, retrying"
            );
            sleep_cancellable(cancel, self.config.discovery_retry_delay);
        }
    }

    /// Probes each URL for its size so the batch total is known up front.
    /// Probe failures leave the size at 0; the transfer resolves it later.
    fn build_batch_tasks(
        &self,
        batch: &[String],
        base_folder: &Path,
        auth: &Option<(String, String)>,
    ) -> (Vec<DownloadTask>, u64) {
        let mut tasks = Vec::with_capacity(batch.len());
        let mut batch_total = 0u64;
        for url in batch {
            let filename = filename_from_url(url);
            let mut task = DownloadTask::new(url.clone(), base_folder.join(&filename));
            let mut probe = DownloadRequest::new(url.clone());
            probe.basic_auth = auth.clone();
            match self.net.head(&probe) {
                Ok(head) if head.status_code < 400 => {
                    task.expected_bytes = head.total_bytes.unwrap_or(0);
                }
                Ok(head) => {
                    debug!(url = %url, status = head.status_code, "size probe rejected");
                }
                Err(err) => {
                    debug!(url = %url, %err, "size probe failed");
                }
            }
            batch_total += task.expected_bytes;
            tasks.push(task);
        }
        (tasks, batch_total)
    }

    fn extract_archive(
        &self,
        extraction: &ExtractionEngine,
        first_volume: &Path,
        outdir: &Path,
        volumes: &[PathBuf],
        delete_after: bool,
        summary: &mut RunSummary,
    ) {
        match extraction.extract(first_volume, outdir) {
            Ok(ExtractOutcome::Extracted { .. }) => {
                summary.archives_extracted += 1;
                if delete_after {
                    for path in volumes {
                        match fs::remove_file(path) {
                            Ok(()) => debug!(path = %path.display(), "removed extracted volume"),
                            Err(err) => {
                                warn!(path = %path.display(), %err, "failed to remove volume")
                            }
                        }
                    }
                }
            }
            Ok(ExtractOutcome::NoPasswordFound) => {
                summary.archives_without_password += 1;
            }
            Err(err) => {
                warn!(archive = %first_volume.display(), %err, "extraction failed");
            }
        }
    }
}

fn filter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)-(\d+)$").unwrap())
}

/// Parses a 1-based inclusive index range like `12-20`.
pub fn parse_filter_range(value: &str) -> CoreResult<(usize, usize)> {
    let caps = filter_pattern().captures(value.trim()).ok_or_else(|| {
        CoreError::Config(format!(
            "filter must be a range like 12-20, got {:?}",
            value
        ))
    })?;
    let start: usize = caps[1]
        .parse()
        .map_err(|_| CoreError::Config(format!("filter start out of range: {}", &caps[1])))?;
    let end: usize = caps[2]
        .parse()
        .map_err(|_| CoreError::Config(format!("filter end out of range: {}", &caps[2])))?;
    if start > end {
        return Err(CoreError::Config(format!(
            "filter start {} is past its end {}",
            start, end
        )));
    }
    Ok((start, end))
}

fn apply_filter_range(links: Vec<String>, start: usize, end: usize) -> Vec<String> {
    let start_index = start.saturating_sub(1).min(links.len());
    let end_index = end.min(links.len());
    links
        .into_iter()
        .skip(start_index)
        .take(end_index.saturating_sub(start_index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveOutcome;
    use crate::net::{HeadResponse, StreamResponse};
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct ScriptedNet {
        bodies: HashMap<String, Vec<u8>>,
        fail: HashSet<String>,
        gets: Mutex<Vec<String>>,
    }

    impl ScriptedNet {
        fn new() -> Self {
            Self {
                bodies: HashMap::new(),
                fail: HashSet::new(),
                gets: Mutex::new(Vec::new()),
            }
        }

        fn with_file(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }

        fn failing(mut self, url: &str) -> Self {
            self.fail.insert(url.to_string());
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.gets.lock().expect("lock").clone()
        }
    }

    impl NetClient for ScriptedNet {
        fn head(&self, req: &DownloadRequest) -> CoreResult<HeadResponse> {
            match self.bodies.get(&req.url) {
                Some(body) if !self.fail.contains(&req.url) => Ok(HeadResponse {
                    status_code: 200,
                    total_bytes: Some(body.len() as u64),
                    accept_ranges: true,
                }),
                _ => Ok(HeadResponse {
                    status_code: 404,
                    total_bytes: None,
                    accept_ranges: false,
                }),
            }
        }

        fn get_stream(&self, req: &DownloadRequest) -> CoreResult<StreamResponse> {
            self.gets.lock().expect("lock").push(req.url.clone());
            if self.fail.contains(&req.url) {
                return Ok(StreamResponse {
                    status_code: 500,
                    total_bytes: None,
                    content_range_total: None,
                    body: Box::new(Cursor::new(Vec::new())),
                });
            }
            match self.bodies.get(&req.url) {
                Some(body) => Ok(StreamResponse {
                    status_code: 200,
                    total_bytes: Some(body.len() as u64),
                    content_range_total: None,
                    body: Box::new(Cursor::new(body.clone())),
                }),
                None => Ok(StreamResponse {
                    status_code: 404,
                    total_bytes: None,
                    content_range_total: None,
                    body: Box::new(Cursor::new(Vec::new())),
                }),
            }
        }
    }

    struct QueuedDiscovery {
        responses: Mutex<VecDeque<Vec<String>>>,
        calls: AtomicUsize,
    }

    impl QueuedDiscovery {
        fn new(responses: Vec<Vec<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl LinkDiscovery for QueuedDiscovery {
        fn discover(
            &self,
            _page_url: &str,
            _format: SiteFormat,
            _use_auth: bool,
        ) -> CoreResult<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .responses
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingArchiver {
        extracts: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl RecordingArchiver {
        fn extracted(&self) -> Vec<(PathBuf, PathBuf)> {
            self.extracts.lock().expect("lock").clone()
        }
    }

    impl Archiver for RecordingArchiver {
        fn test(&self, _archive: &Path, _password: &str) -> CoreResult<ArchiveOutcome> {
            Ok(ArchiveOutcome::Accepted)
        }

        fn extract(
            &self,
            archive: &Path,
            _password: &str,
            outdir: &Path,
        ) -> CoreResult<ArchiveOutcome> {
            self.extracts
                .lock()
                .expect("lock")
                .push((archive.to_path_buf(), outdir.to_path_buf()));
            Ok(ArchiveOutcome::Accepted)
        }
    }

    #[derive(Default)]
    struct RecordingUploader {
        uploads: Mutex<Vec<(PathBuf, String)>>,
    }

    impl RecordingUploader {
        fn uploaded(&self) -> Vec<(PathBuf, String)> {
            self.uploads.lock().expect("lock").clone()
        }
    }

    impl Uploader for RecordingUploader {
        fn upload(&self, folder: &Path, group: &str) -> CoreResult<()> {
            self.uploads
                .lock()
                .expect("lock")
                .push((folder.to_path_buf(), group.to_string()));
            Ok(())
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            concurrency: 2,
            retry_count: 0,
            retry_backoff: Duration::from_millis(1),
            poll_interval: Duration::from_millis(5),
            drain_timeout_per_worker: Duration::from_millis(100),
            discovery_retry_delay: Duration::from_millis(5),
            ..EngineConfig::default()
        }
    }

    fn run_options(page_url: &str, base: &TempDir) -> RunOptions {
        RunOptions {
            page_url: page_url.to_string(),
            site_format: SiteFormat::DonwaGoindex,
            use_auth: false,
            delete_after: false,
            upload: false,
            group_name: None,
            files_limit: None,
            filter: None,
            base_folder: Some(base.path().to_path_buf()),
        }
    }

    #[test]
    fn run_downloads_extracts_and_uploads() {
        let dir = TempDir::new().expect("tempdir");
        let page = "https://index.example.com/Shows/Great%20Show/";
        let part1 = "https://files.example.com/Shows/ep.part1.rar";
        let part2 = "https://files.example.com/Shows/ep.part2.rar";
        let single = "https://files.example.com/Shows/special.rar";
        let video = "https://files.example.com/Shows/clip.mkv";

        let net = ScriptedNet::new()
            .with_file(part1, b"volume one bytes")
            .with_file(part2, b"volume two, longer payload")
            .with_file(single, b"standalone archive")
            .with_file(video, b"not an archive at all");
        let discovery = QueuedDiscovery::new(vec![vec![
            part1.to_string(),
            part2.to_string(),
            single.to_string(),
            video.to_string(),
        ]]);
        let archiver = Arc::new(RecordingArchiver::default());
        let uploader = Arc::new(RecordingUploader::default());

        let engine = DownloadEngine::new(test_config())
            .with_net(Arc::new(net))
            .with_discovery(Arc::new(discovery))
            .with_archiver(archiver.clone())
            .with_uploader(uploader.clone());

        let mut opts = run_options(page, &dir);
        opts.upload = true;
        let summary = engine.run(&opts, &CancelToken::new()).expect("run");

        assert_eq!(summary.discovered, 4);
        assert_eq!(summary.downloaded, 4);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.archives_extracted, 2);
        assert_eq!(summary.archives_without_password, 0);
        assert_eq!(summary.partials_removed, 0);
        assert!(!summary.interrupted);

        let base = dir.path().join("Shows/Great Show");
        assert_eq!(
            fs::read(base.join("ep.part1.rar")).expect("read part1"),
            b"volume one bytes"
        );
        assert_eq!(
            fs::read(base.join("clip.mkv")).expect("read mkv"),
            b"not an archive at all"
        );

        let extracts = archiver.extracted();
        assert_eq!(extracts.len(), 2);
        assert!(extracts
            .iter()
            .any(|(archive, outdir)| archive == &base.join("special.rar") && outdir == &base));
        // the multipart group extracts from volume 1 only
        assert!(extracts
            .iter()
            .any(|(archive, outdir)| archive == &base.join("ep.part1.rar") && outdir == &base));

        assert_eq!(uploader.uploaded(), vec![(base, "TK".to_string())]);
    }

    #[test]
    fn delete_after_removes_every_volume() {
        let dir = TempDir::new().expect("tempdir");
        let page = "https://index.example.com/Movies/Pack/";
        let part1 = "https://files.example.com/m.part1.rar";
        let part2 = "https://files.example.com/m.part2.rar";

        let net = ScriptedNet::new()
            .with_file(part1, b"one")
            .with_file(part2, b"two");
        let discovery =
            QueuedDiscovery::new(vec![vec![part1.to_string(), part2.to_string()]]);
        let archiver = Arc::new(RecordingArchiver::default());

        let engine = DownloadEngine::new(test_config())
            .with_net(Arc::new(net))
            .with_discovery(Arc::new(discovery))
            .with_archiver(archiver.clone())
            .with_uploader(Arc::new(RecordingUploader::default()));

        let mut opts = run_options(page, &dir);
        opts.delete_after = true;
        let summary = engine.run(&opts, &CancelToken::new()).expect("run");

        assert_eq!(summary.archives_extracted, 1);
        let base = dir.path().join("Movies/Pack");
        assert!(!base.join("m.part1.rar").exists());
        assert!(!base.join("m.part2.rar").exists());
    }

    #[test]
    fn failed_download_is_counted_and_not_extracted() {
        let dir = TempDir::new().expect("tempdir");
        let page = "https://index.example.com/Stuff/";
        let good = "https://files.example.com/good.rar";
        let bad = "https://files.example.com/bad.rar";

        let net = ScriptedNet::new()
            .with_file(good, b"fine")
            .with_file(bad, b"never served")
            .failing(bad);
        let discovery = QueuedDiscovery::new(vec![vec![good.to_string(), bad.to_string()]]);
        let archiver = Arc::new(RecordingArchiver::default());

        let engine = DownloadEngine::new(test_config())
            .with_net(Arc::new(net))
            .with_discovery(Arc::new(discovery))
            .with_archiver(archiver.clone())
            .with_uploader(Arc::new(RecordingUploader::default()));

        let summary = engine
            .run(&run_options(page, &dir), &CancelToken::new())
            .expect("run");

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.archives_extracted, 1);
        let extracts = archiver.extracted();
        assert_eq!(extracts.len(), 1);
        assert!(extracts[0].0.ends_with("good.rar"));
    }

    #[test]
    fn filter_and_limit_slice_the_discovered_list() {
        let dir = TempDir::new().expect("tempdir");
        let page = "https://index.example.com/Lots/";
        let urls: Vec<String> = (1..=5)
            .map(|i| format!("https://files.example.com/f{}.bin", i))
            .collect();

        let mut net = ScriptedNet::new();
        for url in &urls {
            net = net.with_file(url, b"data");
        }
        let net = Arc::new(net);
        let discovery = QueuedDiscovery::new(vec![urls.clone()]);
        let uploader = Arc::new(RecordingUploader::default());

        let engine = DownloadEngine::new(test_config())
            .with_net(net.clone())
            .with_discovery(Arc::new(discovery))
            .with_archiver(Arc::new(RecordingArchiver::default()))
            .with_uploader(uploader.clone());

        let mut opts = run_options(page, &dir);
        opts.filter = Some((2, 4));
        opts.files_limit = Some(2);
        opts.upload = true;
        opts.group_name = Some("Subs".to_string());
        let summary = engine.run(&opts, &CancelToken::new()).expect("run");

        assert_eq!(summary.downloaded, 3);
        let mut fetched = net.fetched();
        fetched.sort();
        assert_eq!(fetched, urls[1..4].to_vec());

        // two batches of (2, 1) files, uploaded after each
        let uploads = uploader.uploaded();
        assert_eq!(uploads.len(), 2);
        assert!(uploads.iter().all(|(_, group)| group == "Subs"));
    }

    #[test]
    fn discovery_retries_until_links_appear() {
        let dir = TempDir::new().expect("tempdir");
        let page = "https://index.example.com/Late/";
        let url = "https://files.example.com/late.bin";

        let net = ScriptedNet::new().with_file(url, b"here");
        let discovery = Arc::new(QueuedDiscovery::new(vec![
            Vec::new(),
            Vec::new(),
            vec![url.to_string()],
        ]));

        let engine = DownloadEngine::new(test_config())
            .with_net(Arc::new(net))
            .with_discovery(discovery.clone())
            .with_archiver(Arc::new(RecordingArchiver::default()))
            .with_uploader(Arc::new(RecordingUploader::default()));

        let summary = engine
            .run(&run_options(page, &dir), &CancelToken::new())
            .expect("run");

        assert_eq!(summary.downloaded, 1);
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stopped_token_short_circuits_without_discovery() {
        let dir = TempDir::new().expect("tempdir");
        let discovery = Arc::new(QueuedDiscovery::new(vec![vec![
            "https://files.example.com/x.bin".to_string(),
        ]]));
        let engine = DownloadEngine::new(test_config())
            .with_net(Arc::new(ScriptedNet::new()))
            .with_discovery(discovery.clone())
            .with_archiver(Arc::new(RecordingArchiver::default()))
            .with_uploader(Arc::new(RecordingUploader::default()));

        let cancel = CancelToken::new();
        cancel.stop();
        let summary = engine
            .run(&run_options("https://index.example.com/A/", &dir), &cancel)
            .expect("run");

        assert!(summary.interrupted);
        assert_eq!(summary.downloaded, 0);
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn parse_filter_range_accepts_start_end() {
        assert_eq!(parse_filter_range("12-20").expect("parse"), (12, 20));
        assert_eq!(parse_filter_range(" 3-3 ").expect("parse"), (3, 3));
    }

    #[test]
    fn parse_filter_range_rejects_bad_input() {
        assert!(parse_filter_range("5").is_err());
        assert!(parse_filter_range("a-b").is_err());
        assert!(parse_filter_range("9-3").is_err());
        assert!(parse_filter_range("1-2-3").is_err());
    }

    #[test]
    fn apply_filter_range_is_one_based_inclusive() {
        let links: Vec<String> = (1..=5).map(|i| i.to_string()).collect();
        assert_eq!(
            apply_filter_range(links.clone(), 2, 4),
            vec!["2".to_string(), "3".to_string(), "4".to_string()]
        );
        assert_eq!(apply_filter_range(links.clone(), 1, 99).len(), 5);
        assert!(apply_filter_range(links, 7, 9).is_empty());
    }
}

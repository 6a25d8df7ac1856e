use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use packfetch_core::config::EngineConfig;
use packfetch_core::engine::parse_filter_range;
use packfetch_core::progress::{ProgressAggregator, ProgressSnapshot};
use packfetch_core::storage::SqliteStore;
use packfetch_core::{CancelToken, DownloadEngine, RunOptions, RunSummary, SiteFormat, TaskId};

#[derive(Parser, Debug)]
#[command(version, about = "Batch downloader for drive index sites", long_about = None)]
struct Args {
    /// Index page listing the files to fetch.
    #[arg(long)]
    url: String,

    /// Index flavor serving the page.
    #[arg(long, value_parser = parse_site_format)]
    site_format: SiteFormat,

    /// Parallel downloads.
    #[arg(long, default_value_t = 3)]
    simultaneous: usize,

    /// Remove archive volumes once extraction succeeds.
    #[arg(long, action)]
    delete_after: bool,

    /// Mirror the folder to the rclone remote after each batch.
    #[arg(long, action)]
    upload: bool,

    /// Process at most this many files per batch.
    #[arg(long)]
    limit: Option<usize>,

    /// One aggregate progress line instead of per-file bars.
    #[arg(long, action)]
    stats_one_line: bool,

    /// 1-based inclusive slice of the listing, e.g. 12-20.
    #[arg(long, value_parser = parse_filter)]
    filter: Option<(usize, usize)>,

    /// Send HTTP basic auth from PACKFETCH_USER / PACKFETCH_PASSWORD.
    #[arg(long, action)]
    use_auth: bool,

    /// Group tag for the upload destination.
    #[arg(long)]
    group_name: Option<String>,

    /// Directory the download folder is created under.
    #[arg(long)]
    base_folder: Option<PathBuf>,
}

fn parse_site_format(value: &str) -> Result<SiteFormat, String> {
    SiteFormat::from_str(value).ok_or_else(|| {
        let known = SiteFormat::all().map(|format| format.as_str()).join(", ");
        format!("unknown site format {:?}, expected one of: {}", value, known)
    })
}

fn parse_filter(value: &str) -> Result<(usize, usize), String> {
    parse_filter_range(value).map_err(|err| err.to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let mut config = EngineConfig::from_env();
    config.concurrency = args.simultaneous.max(1);

    let mut engine = DownloadEngine::new(config.clone());
    if let Some(path) = &config.store_path {
        match SqliteStore::new(path.display().to_string()) {
            Ok(store) => engine = engine.with_store(Box::new(store)),
            Err(err) => {
                eprintln!("error: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }

    let opts = RunOptions {
        page_url: args.url.clone(),
        site_format: args.site_format,
        use_auth: args.use_auth,
        delete_after: args.delete_after,
        upload: args.upload,
        group_name: args.group_name.clone(),
        files_limit: args.limit,
        filter: args.filter,
        base_folder: args.base_folder.clone(),
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("stopping, draining active downloads...");
        handler_token.stop();
    }) {
        eprintln!("error: failed to set signal handler: {}", err);
        return ExitCode::FAILURE;
    }

    let engine = Arc::new(engine);
    let progress = engine.progress();
    let worker = {
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        thread::spawn(move || engine.run(&opts, &cancel))
    };

    run_display(&progress, &worker, args.stats_one_line);

    match worker.join() {
        Ok(Ok(summary)) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
        Err(_) => {
            eprintln!("error: download thread panicked");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    // progress bars own stdout; logs go to stderr, opt in with RUST_LOG
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_display(
    progress: &ProgressAggregator,
    worker: &thread::JoinHandle<Result<RunSummary, packfetch_core::CoreError>>,
    one_line: bool,
) {
    let mut display = ProgressDisplay::new(one_line);
    while !worker.is_finished() {
        display.render(&progress.snapshot());
        thread::sleep(Duration::from_millis(250));
    }
    display.render(&progress.snapshot());
    display.clear();
}

struct ProgressDisplay {
    multi: MultiProgress,
    total: ProgressBar,
    bars: HashMap<TaskId, ProgressBar>,
    one_line: bool,
}

impl ProgressDisplay {
    fn new(one_line: bool) -> Self {
        let multi = MultiProgress::new();
        let total = multi.add(ProgressBar::new(0));
        total.set_style(
            ProgressStyle::default_bar()
                .template("Total [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec} {msg}")
                .expect("Invalid template")
                .progress_chars("█▓▒░"),
        );
        total.enable_steady_tick(Duration::from_millis(100));
        Self {
            multi,
            total,
            bars: HashMap::new(),
            one_line,
        }
    }

    fn render(&mut self, snapshot: &ProgressSnapshot) {
        self.total
            .set_length(snapshot.batch_total.max(snapshot.batch_completed));
        self.total.set_position(snapshot.batch_completed);
        if self.one_line {
            let active = snapshot.tasks.iter().filter(|task| !task.done).count();
            self.total.set_message(format!("({} active)", active));
            return;
        }

        for task in &snapshot.tasks {
            let bar = self.bars.entry(task.id).or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(task.total_bytes));
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            " └─ {spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
                        )
                        .expect("Invalid template")
                        .progress_chars("█▓▒░"),
                );
                bar.set_message(short_name(&task.name));
                bar
            });
            bar.set_length(task.total_bytes.max(task.completed_bytes));
            bar.set_position(task.completed_bytes);
            if task.done && !bar.is_finished() {
                bar.finish();
            }
        }

        // a new batch resets the snapshot; drop bars for vanished tasks
        let live: Vec<TaskId> = snapshot.tasks.iter().map(|task| task.id).collect();
        let multi = &self.multi;
        self.bars.retain(|id, bar| {
            if live.contains(id) {
                true
            } else {
                bar.finish_and_clear();
                multi.remove(bar);
                false
            }
        });
    }

    fn clear(&self) {
        for bar in self.bars.values() {
            bar.finish_and_clear();
        }
        self.total.finish_and_clear();
        let _ = self.multi.clear();
    }
}

fn short_name(name: &str) -> String {
    if name.chars().count() > 18 {
        let head: String = name.chars().take(15).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} downloaded, {} failed, {} canceled ({})",
        summary.downloaded,
        summary.failed,
        summary.canceled,
        HumanBytes(summary.bytes_downloaded)
    );
    if summary.archives_extracted > 0 || summary.archives_without_password > 0 {
        println!(
            "{} archives extracted, {} without a working password",
            summary.archives_extracted, summary.archives_without_password
        );
    }
    if summary.partials_removed > 0 {
        println!(
            "{} incomplete partial file(s) removed",
            summary.partials_removed
        );
    }
    if summary.interrupted {
        println!("interrupted, exiting cleanly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_format_parser_accepts_known_tags() {
        assert_eq!(
            parse_site_format("donwa/goindex").expect("parse"),
            SiteFormat::DonwaGoindex
        );
        assert_eq!(
            parse_site_format("spencerwooo/onedrive").expect("parse"),
            SiteFormat::SpencerwoooOnedrive
        );
    }

    #[test]
    fn site_format_parser_lists_alternatives_on_error() {
        let err = parse_site_format("nginx/autoindex").expect_err("must fail");
        assert!(err.contains("donwa/goindex"));
        assert!(err.contains("maple3142/GDIndex"));
    }

    #[test]
    fn filter_parser_wraps_core_errors() {
        assert_eq!(parse_filter("3-7").expect("parse"), (3, 7));
        assert!(parse_filter("7-3").is_err());
    }

    #[test]
    fn long_names_are_truncated_with_ellipsis() {
        assert_eq!(short_name("short.rar"), "short.rar");
        assert_eq!(
            short_name("a.very.long.episode.name.part1.rar"),
            "a.very.long.epi..."
        );
    }

    #[test]
    fn cli_parses_a_full_invocation() {
        let args = Args::parse_from([
            "packfetch",
            "--url",
            "https://index.example.com/Shows/",
            "--site-format",
            "donwa/goindex",
            "--simultaneous",
            "5",
            "--delete-after",
            "--upload",
            "--limit",
            "10",
            "--filter",
            "2-8",
            "--group-name",
            "Subs",
        ]);
        assert_eq!(args.simultaneous, 5);
        assert!(args.delete_after);
        assert!(args.upload);
        assert_eq!(args.limit, Some(10));
        assert_eq!(args.filter, Some((2, 8)));
        assert_eq!(args.group_name.as_deref(), Some("Subs"));
        assert_eq!(args.site_format, SiteFormat::DonwaGoindex);
    }

    #[test]
    fn cli_defaults_are_conservative() {
        let args = Args::parse_from([
            "packfetch",
            "--url",
            "https://index.example.com/Shows/",
            "--site-format",
            "maple3142/GDIndex",
        ]);
        assert_eq!(args.simultaneous, 3);
        assert!(!args.delete_after);
        assert!(!args.upload);
        assert!(!args.stats_one_line);
        assert!(args.filter.is_none());
        assert!(args.base_folder.is_none());
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use mediafetch_core::logging::init_logging;
use mediafetch_core::resolver::UnsupportedProvider;
use mediafetch_core::{
    BatchRun, DownloadJob, EngineConfig, ExpectedSize, JobId, JobResult, JobState, MediaMode,
    ProgressSink, QualityPreference, Scheduler, TransferProgress, TransferState,
};

/// Download media files from direct links, several at a time.
#[derive(Parser, Debug)]
#[command(name = "mediafetch", version, about)]
struct Cli {
    /// URLs to download.
    urls: Vec<String>,

    /// Directory downloads are saved into.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Prefer the audio-only stream of structured sources.
    #[arg(long)]
    audio_only: bool,

    #[arg(long, value_enum, default_value_t = Quality::Highest)]
    quality: Quality,

    /// Concurrent downloads (defaults to the config value).
    #[arg(short, long)]
    jobs: Option<usize>,

    /// File with one URL per line. Blank lines and `#` comments are skipped.
    #[arg(short = 'f', long)]
    batch_file: Option<PathBuf>,

    /// TOML engine config.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More log output (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Quality {
    Highest,
    Lowest,
}

impl From<Quality> for QualityPreference {
    fn from(value: Quality) -> Self {
        match value {
            Quality::Highest => QualityPreference::Highest,
            Quality::Lowest => QualityPreference::Lowest,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("error: {:#}", err);
            process::exit(2);
        }
    }
}

/// Returns `Ok(false)` when at least one job did not succeed.
fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let mut urls = cli.urls.clone();
    if let Some(path) = &cli.batch_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading batch file {}", path.display()))?;
        urls.extend(batch_urls(&text));
    }
    if urls.is_empty() {
        bail!("no URL given (pass URLs or --batch-file)");
    }

    let mode = if cli.audio_only {
        MediaMode::AudioOnly
    } else {
        MediaMode::Video
    };
    let jobs: Vec<DownloadJob> = urls
        .into_iter()
        .map(|url| {
            DownloadJob::new(url, &cli.output)
                .with_mode(mode)
                .with_quality(cli.quality.into())
        })
        .collect();
    let scheduler = Scheduler::with_reqwest(config, Arc::new(UnsupportedProvider))
        .context("building downloader")?;
    let concurrency = cli.jobs.unwrap_or(scheduler.config().max_concurrent_jobs);
    tracing::debug!(
        "queued {} jobs into {}, concurrency {}",
        jobs.len(),
        cli.output.display(),
        concurrency
    );

    let mut batch = BatchRun::new(jobs, concurrency)?;
    let control = batch.control();
    ctrlc::set_handler(move || control.cancel_all()).context("installing Ctrl-C handler")?;
    let sink = ConsoleSink::new(batch.jobs());
    scheduler.run(&mut batch, &sink);
    if batch.control().is_batch_canceled() {
        eprintln!("interrupted, unfinished downloads were discarded");
    }

    let results = batch.into_results();
    print_summary(&results);
    Ok(results.iter().all(JobResult::is_success))
}

fn batch_urls(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

fn print_summary(results: &[JobResult]) {
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let canceled = results
        .iter()
        .filter(|r| r.state == JobState::Canceled)
        .count();
    let failed = results.len() - succeeded - canceled;
    println!(
        "{} downloaded, {} failed, {} canceled",
        succeeded, failed, canceled
    );
}

/// Prints a line per job every 10% (or every MiB when the size is unknown).
struct ConsoleSink {
    labels: HashMap<JobId, String>,
    last: Mutex<HashMap<JobId, u64>>,
}

impl ConsoleSink {
    fn new(jobs: &[DownloadJob]) -> Self {
        let labels = jobs
            .iter()
            .map(|job| (job.id, job.id.to_string()[..8].to_string()))
            .collect();
        Self {
            labels,
            last: Mutex::new(HashMap::new()),
        }
    }

    fn label(&self, job_id: JobId) -> String {
        self.labels
            .get(&job_id)
            .cloned()
            .unwrap_or_else(|| job_id.to_string())
    }
}

impl ProgressSink for ConsoleSink {
    fn on_job_progress(&self, progress: &TransferProgress) {
        if progress.state != TransferState::Transferring {
            return;
        }
        let step = match progress.expected_size {
            ExpectedSize::Bytes(total) => {
                (progress.bytes_transferred.saturating_mul(10) / total.max(1)).min(10)
            }
            ExpectedSize::Unknown => progress.bytes_transferred / (1024 * 1024),
        };
        {
            let mut last = self.last.lock().unwrap_or_else(|err| err.into_inner());
            let previous = last.entry(progress.job_id).or_insert(u64::MAX);
            if *previous == step {
                return;
            }
            *previous = step;
        }

        let percent = match progress.fraction() {
            Some(fraction) => format!("{:.1}%", fraction * 100.0),
            None => "--".to_string(),
        };
        let total = match progress.expected_size {
            ExpectedSize::Bytes(total) => format_bytes(total),
            ExpectedSize::Unknown => "?".to_string(),
        };
        println!(
            "[{}] {} {}/{}",
            self.label(progress.job_id),
            percent,
            format_bytes(progress.bytes_transferred),
            total
        );
    }

    fn on_job_status(&self, job_id: JobId, message: &str) {
        println!("[{}] {}", self.label(job_id), message);
    }

    fn on_batch_progress(&self, completed: usize, total: usize) {
        if total > 1 {
            println!("{}/{} jobs done", completed, total);
        }
    }

    fn on_job_result(&self, result: &JobResult) {
        self.last
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(&result.job_id);
        if let Some(path) = &result.final_path {
            println!(
                "[{}] saved {} ({})",
                self.label(result.job_id),
                path.display(),
                format_bytes(result.bytes_transferred)
            );
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2}GB", b / GB)
    } else if b >= MB {
        format!("{:.2}MB", b / MB)
    } else if b >= KB {
        format!("{:.2}KB", b / KB)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_file_skips_comments_and_blanks() {
        let text = "https://a.example.com/1.mp4\n\n  # later\n  https://b.example.com/2.mp4  \n";
        let urls: Vec<String> = batch_urls(text).collect();
        assert_eq!(
            urls,
            vec!["https://a.example.com/1.mp4", "https://b.example.com/2.mp4"]
        );
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.50KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00MB");
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "mediafetch",
            "-j",
            "3",
            "--quality",
            "lowest",
            "--audio-only",
            "-vv",
            "https://a.example.com/1.mp4",
        ])
        .unwrap();
        assert_eq!(cli.jobs, Some(3));
        assert_eq!(cli.quality, Quality::Lowest);
        assert!(cli.audio_only);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output, PathBuf::from("."));
    }
}

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::ProgressOutput;
use segdl::utils::resolve_destination;
use segdl::{CancellationToken, DownloadConfig, DownloadCoordinator, DownloadJob, ProgressSnapshot, ReportMode};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL to download
    #[arg(index = 1)]
    url: String,

    /// Destination file, or an existing directory to place it in
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Number of concurrent segments (defaults to number of logical CPUs)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Bytes per positional write (clamped to 1 KiB..64 KiB)
    #[arg(long, default_value_t = segdl::config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Global rate limit in bytes per second (e.g., 1048576 for 1MB/s)
    #[arg(short = 'r', long)]
    rate_limit: Option<NonZeroU32>,

    /// Progress aggregation interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,

    /// Also report progress after chunk writes, not only on each tick
    #[arg(long)]
    per_chunk: bool,

    #[arg(long, value_enum, default_value = "bar")]
    progress: ProgressOutput,

    /// Debug-level logging for the downloader
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    segdl::logging::init_logging(args.verbose);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let url = url::Url::parse(&args.url).with_context(|| format!("Invalid URL: {}", args.url))?;
    let destination = resolve_destination(&url, args.output.as_deref());
    let workers = args.workers.unwrap_or_else(DownloadConfig::default_worker_count);

    let config = DownloadConfig::default()
        .with_chunk_size(args.chunk_size)
        .with_tick_interval(Duration::from_millis(args.tick_ms.max(1)))
        .with_rate_limit(args.rate_limit)
        .with_report(if args.per_chunk { ReportMode::PerChunk } else { ReportMode::Interval });
    let coordinator = DownloadCoordinator::new(config).context("Failed to build HTTP client")?;

    let mut job = DownloadJob::new(url.as_str(), destination.clone(), workers)?;
    let bars = match args.progress {
        ProgressOutput::Bar => {
            let bars = ProgressBars::new(workers);
            let view = bars.clone();
            job = job.with_progress(move |snapshot| view.update(snapshot));
            Some(bars)
        }
        ProgressOutput::Json => {
            job = job.with_progress(|snapshot| {
                if let Ok(line) = serde_json::to_string(snapshot) {
                    println!("{}", line);
                }
            });
            None
        }
        ProgressOutput::None => None,
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping workers");
            on_ctrl_c.cancel();
        }
    });

    let result = coordinator.run_until_cancelled(&job, cancel).await;
    if let Some(bars) = &bars {
        bars.finish(result.is_ok());
    }

    match result {
        Ok(report) => {
            eprintln!(
                "Saved {} ({}) in {:.1}s, {}/s",
                destination.display(),
                HumanBytes(report.total_size),
                report.elapsed.as_secs_f64(),
                HumanBytes(report.average_speed as u64)
            );
            Ok(())
        }
        Err(e) => {
            for range in e.incomplete_ranges() {
                tracing::info!(%range, "not written");
            }
            Err(e).with_context(|| format!("Failed to download {}", url))
        }
    }
}

/// Aggregate bar plus one bar per worker.
#[derive(Clone)]
struct ProgressBars {
    _multi: MultiProgress,
    total: ProgressBar,
    workers: Vec<ProgressBar>,
}

impl ProgressBars {
    fn new(worker_count: usize) -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

        let total = multi.add(ProgressBar::new(0));
        total.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        let worker_style = ProgressStyle::default_bar()
            .template("  {prefix:>4} [{bar:30.white/black}] {bytes:>12}/{total_bytes:<12} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        let workers = (0..worker_count)
            .map(|i| {
                let bar = multi.add(ProgressBar::new(0));
                bar.set_style(worker_style.clone());
                bar.set_prefix(format!("#{}", i + 1));
                bar
            })
            .collect();

        Self {
            _multi: multi,
            total,
            workers,
        }
    }

    fn update(&self, snapshot: &ProgressSnapshot) {
        self.total.set_length(snapshot.total_size);
        self.total.set_position(snapshot.downloaded);
        self.total.set_message(format!(
            "{}/s {:.2}%",
            HumanBytes(snapshot.speed as u64),
            snapshot.percent
        ));

        for worker in &snapshot.workers {
            if let Some(bar) = self.workers.get(worker.index) {
                bar.set_length(worker.range.len());
                bar.set_position(worker.downloaded);
                bar.set_message(format!("{}/s", HumanBytes(worker.speed as u64)));
            }
        }
        // The probe may have fallen back to fewer workers than bars.
        for bar in self.workers.iter().skip(snapshot.workers.len()) {
            bar.finish_and_clear();
        }
    }

    fn finish(&self, ok: bool) {
        for bar in &self.workers {
            bar.finish_and_clear();
        }
        if ok {
            self.total.finish_with_message("Completed");
        } else {
            self.total.abandon_with_message("Failed");
        }
    }
}

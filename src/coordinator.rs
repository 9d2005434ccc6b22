//! Drives one download job from probe to final progress snapshot.

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::{DownloadConfig, ReportMode};
use crate::error::{DownloadError, SegmentError, TransportError};
use crate::job::DownloadJob;
use crate::planner::{plan, ByteRange};
use crate::probe::SizeProber;
use crate::progress::{ProgressAggregator, ProgressSnapshot, WorkerState};
use crate::storage::DestinationFile;
use crate::transport::{HttpTransport, RangeTransport};
use crate::worker::{SegmentWorker, Throttle};

/// Outcome of a successful job.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadReport {
    pub total_size: u64,
    pub worker_count: usize,
    pub elapsed: Duration,
    /// Mean bytes per second over the whole job.
    pub average_speed: f64,
}

pub struct DownloadCoordinator {
    transport: Arc<dyn RangeTransport>,
    config: DownloadConfig,
}

impl DownloadCoordinator {
    /// Coordinator backed by a fresh `reqwest` client.
    pub fn new(config: DownloadConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn with_transport(transport: Arc<dyn RangeTransport>, config: DownloadConfig) -> Self {
        Self { transport, config }
    }

    pub async fn run(&self, job: &DownloadJob) -> Result<DownloadReport, DownloadError> {
        self.run_until_cancelled(job, CancellationToken::new()).await
    }

    /// Runs `job` until it completes, fails, or `cancel` fires.
    ///
    /// On failure every worker is stopped and joined before the error is
    /// returned; the destination keeps whatever was written.
    pub async fn run_until_cancelled(
        &self,
        job: &DownloadJob,
        cancel: CancellationToken,
    ) -> Result<DownloadReport, DownloadError> {
        let started = Instant::now();
        let url = job.url();

        let prober = SizeProber::new(self.transport.clone());
        let probe = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled { incomplete: Vec::new() }),
            probe = prober.probe(url) => probe?,
        };

        let mut worker_count = job.worker_count();
        if !probe.accepts_ranges && worker_count > 1 {
            tracing::warn!(%url, "server does not advertise byte ranges, using a single connection");
            worker_count = 1;
        }

        let destination = DestinationFile::prepare(job.destination(), probe.total_size)
            .await
            .map_err(|source| DownloadError::Destination {
                path: job.destination().to_path_buf(),
                source,
            })?;

        let ranges = plan(probe.total_size, worker_count);
        let states: Vec<Arc<WorkerState>> = ranges.iter().map(|_| Arc::new(WorkerState::new())).collect();
        let mut aggregator = ProgressAggregator::starting_at(probe.total_size, ranges.clone(), states.clone(), started);

        tracing::info!(
            %url,
            destination = %job.destination().display(),
            total_size = probe.total_size,
            workers = worker_count,
            "download started"
        );

        let chunk_notify = match self.config.report {
            ReportMode::PerChunk => Some(Arc::new(Notify::new())),
            ReportMode::Interval => None,
        };
        let throttle = self.config.rate_limit.map(|rate| Arc::new(Throttle::per_second(rate)));
        let worker_cancel = cancel.child_token();
        // Stops the workers if this future is dropped mid-download.
        let _stop_workers = worker_cancel.clone().drop_guard();

        let mut pending: FuturesUnordered<_> = ranges
            .iter()
            .zip(&states)
            .enumerate()
            .map(|(index, (range, state))| {
                let worker = SegmentWorker {
                    index,
                    range: *range,
                    url: url.clone(),
                    destination: destination.path().to_path_buf(),
                    transport: self.transport.clone(),
                    state: state.clone(),
                    chunk_size: self.config.effective_chunk_size(),
                    throttle: throttle.clone(),
                    chunk_notify: chunk_notify.clone(),
                    cancel: worker_cancel.clone(),
                };
                tokio::spawn(worker.run()).map(move |joined| (index, joined))
            })
            .collect();

        let period = self.config.tick_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut failure: Option<(usize, SegmentError)> = None;

        loop {
            tokio::select! {
                joined = pending.next() => {
                    let Some((index, joined)) = joined else { break };
                    let outcome = joined.unwrap_or_else(|e| Err(SegmentError::Aborted(e.to_string())));
                    match outcome {
                        Ok(()) | Err(SegmentError::Cancelled) => {}
                        Err(err) if failure.is_none() => {
                            tracing::error!(
                                worker = index,
                                range = %ranges[index],
                                error = %err,
                                "segment failed, stopping remaining workers"
                            );
                            worker_cancel.cancel();
                            failure = Some((index, err));
                        }
                        Err(err) => {
                            tracing::debug!(worker = index, error = %err, "further segment failure");
                        }
                    }
                }
                _ = ticker.tick(), if failure.is_none() && !worker_cancel.is_cancelled() => {
                    emit(job, &aggregator.tick());
                }
                _ = chunk_written(chunk_notify.as_deref()), if failure.is_none() && !worker_cancel.is_cancelled() => {
                    emit(job, &aggregator.tick());
                }
            }
        }

        if let Some((worker, source)) = failure {
            return Err(DownloadError::Segment {
                worker,
                range: ranges[worker],
                incomplete: unwritten(&ranges, &states),
                source,
            });
        }

        let incomplete = unwritten(&ranges, &states);
        if !incomplete.is_empty() {
            tracing::info!(%url, remaining = incomplete.len(), "download cancelled");
            return Err(DownloadError::Cancelled { incomplete });
        }

        destination.sync().await.map_err(|source| DownloadError::Destination {
            path: job.destination().to_path_buf(),
            source,
        })?;

        let snapshot = aggregator.finish();
        debug_assert_eq!(snapshot.downloaded, probe.total_size);
        emit(job, &snapshot);

        let elapsed = started.elapsed();
        let report = DownloadReport {
            total_size: probe.total_size,
            worker_count,
            elapsed,
            average_speed: rate(probe.total_size, elapsed),
        };
        tracing::info!(
            %url,
            total_size = report.total_size,
            elapsed_ms = elapsed.as_millis() as u64,
            "download finished"
        );
        Ok(report)
    }
}

fn emit(job: &DownloadJob, snapshot: &ProgressSnapshot) {
    tracing::trace!(downloaded = snapshot.downloaded, percent = snapshot.percent, "progress");
    if let Some(callback) = job.progress() {
        callback(snapshot);
    }
}

async fn chunk_written(notify: Option<&Notify>) {
    match notify {
        Some(notify) => notify.notified().await,
        None => futures::future::pending().await,
    }
}

/// Unwritten tail of every window whose worker did not complete.
fn unwritten(ranges: &[ByteRange], states: &[Arc<WorkerState>]) -> Vec<ByteRange> {
    ranges
        .iter()
        .zip(states)
        .filter(|(range, state)| !range.is_empty() && !state.is_complete())
        .map(|(range, state)| ByteRange::new(range.start + state.downloaded(), range.end))
        .collect()
}

fn rate(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 / secs
}

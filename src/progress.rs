//! Per-worker counters and the aggregator that turns them into snapshots.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::planner::ByteRange;

/// Highest percentage an in-flight snapshot may report; 100 is reserved for
/// the final snapshot.
pub const IN_FLIGHT_PERCENT_CAP: f64 = 99.99;

/// Samples closer together than this reuse the previous speeds.
const MIN_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

/// Counters of one worker. Written only by that worker, read by the aggregator.
#[derive(Debug, Default)]
pub struct WorkerState {
    downloaded: AtomicU64,
    complete: AtomicBool,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::Release);
    }

    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerProgress {
    pub index: usize,
    pub range: ByteRange,
    pub downloaded: u64,
    /// Bytes per second over the last sample window.
    pub speed: f64,
    pub complete: bool,
}

/// Global view of a running job, handed to the progress callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub total_size: u64,
    pub downloaded: u64,
    /// Bytes per second over the last sample window.
    pub speed: f64,
    pub percent: f64,
    pub elapsed_secs: f64,
    /// Set only on the snapshot delivered after every worker finished.
    pub finished: bool,
    /// Indexed by worker.
    pub workers: Vec<WorkerProgress>,
}

impl ProgressSnapshot {
    /// Mean throughput since the job started.
    pub fn average_speed(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.downloaded as f64 / self.elapsed_secs
    }
}

/// Pulls worker counters and derives totals, speeds and percentage.
///
/// Speed is windowed: `(bytes_now - bytes_at_last_sample) / seconds_since_last_sample`,
/// computed the same way for the aggregate and for each worker.
pub struct ProgressAggregator {
    total_size: u64,
    ranges: Vec<ByteRange>,
    workers: Vec<Arc<WorkerState>>,
    started: Instant,
    last_sample: Instant,
    last_total: u64,
    last_per_worker: Vec<u64>,
    speed: f64,
    worker_speeds: Vec<f64>,
}

impl ProgressAggregator {
    pub fn starting_at(
        total_size: u64,
        ranges: Vec<ByteRange>,
        workers: Vec<Arc<WorkerState>>,
        started: Instant,
    ) -> Self {
        let count = workers.len();
        Self {
            total_size,
            ranges,
            workers,
            started,
            last_sample: started,
            last_total: 0,
            last_per_worker: vec![0; count],
            speed: 0.0,
            worker_speeds: vec![0.0; count],
        }
    }

    /// In-flight snapshot; never reports 100%.
    pub fn tick(&mut self) -> ProgressSnapshot {
        self.sample(Instant::now(), false)
    }

    /// Snapshot taken once every worker has completed.
    pub fn finish(&mut self) -> ProgressSnapshot {
        self.sample(Instant::now(), true)
    }

    pub fn sample(&mut self, now: Instant, finished: bool) -> ProgressSnapshot {
        let per_worker: Vec<(u64, bool)> = self
            .workers
            .iter()
            .map(|w| (w.downloaded(), w.is_complete()))
            .collect();
        let downloaded: u64 = per_worker.iter().map(|(bytes, _)| bytes).sum();
        debug_assert!(downloaded <= self.total_size);

        let window = now.saturating_duration_since(self.last_sample);
        if window >= MIN_SAMPLE_WINDOW || (finished && !window.is_zero()) {
            let secs = window.as_secs_f64();
            self.speed = downloaded.saturating_sub(self.last_total) as f64 / secs;
            for (i, (bytes, _)) in per_worker.iter().enumerate() {
                self.worker_speeds[i] = bytes.saturating_sub(self.last_per_worker[i]) as f64 / secs;
                self.last_per_worker[i] = *bytes;
            }
            self.last_total = downloaded;
            self.last_sample = now;
        }

        let workers = per_worker
            .iter()
            .enumerate()
            .map(|(index, (bytes, complete))| WorkerProgress {
                index,
                range: self.ranges.get(index).copied().unwrap_or(ByteRange::new(0, 0)),
                downloaded: *bytes,
                speed: self.worker_speeds[index],
                complete: *complete,
            })
            .collect();

        ProgressSnapshot {
            total_size: self.total_size,
            downloaded,
            speed: self.speed,
            percent: self.percent(downloaded, finished),
            elapsed_secs: now.saturating_duration_since(self.started).as_secs_f64(),
            finished,
            workers,
        }
    }

    fn percent(&self, downloaded: u64, finished: bool) -> f64 {
        if finished {
            return 100.0;
        }
        if self.total_size == 0 {
            return 0.0;
        }
        (downloaded as f64 / self.total_size as f64 * 100.0).min(IN_FLIGHT_PERCENT_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan;

    fn setup(total: u64, count: usize) -> (Vec<Arc<WorkerState>>, ProgressAggregator, Instant) {
        let states: Vec<_> = (0..count).map(|_| Arc::new(WorkerState::new())).collect();
        let start = Instant::now();
        let agg = ProgressAggregator::starting_at(total, plan(total, count), states.clone(), start);
        (states, agg, start)
    }

    #[test]
    fn sums_worker_counters() {
        let (states, mut agg, start) = setup(1000, 3);
        states[0].record(100);
        states[2].record(50);
        let snap = agg.sample(start + Duration::from_secs(1), false);
        assert_eq!(snap.downloaded, 150);
        assert_eq!(snap.workers.len(), 3);
        assert_eq!(snap.workers[0].downloaded, 100);
        assert_eq!(snap.workers[1].downloaded, 0);
        assert_eq!(snap.workers[2].range, ByteRange::new(666, 1000));
        assert!((snap.percent - 15.0).abs() < 1e-9);
        assert!(!snap.finished);
    }

    #[test]
    fn speed_is_windowed() {
        let (states, mut agg, start) = setup(10_000, 2);
        states[0].record(1000);
        let first = agg.sample(start + Duration::from_secs(1), false);
        assert!((first.speed - 1000.0).abs() < 1e-9);
        assert!((first.workers[0].speed - 1000.0).abs() < 1e-9);

        states[1].record(500);
        let second = agg.sample(start + Duration::from_secs(3), false);
        assert!((second.speed - 250.0).abs() < 1e-9);
        assert_eq!(second.workers[0].speed, 0.0);
        assert!((second.workers[1].speed - 250.0).abs() < 1e-9);
        assert!((second.average_speed() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn close_samples_reuse_previous_speed() {
        let (states, mut agg, start) = setup(10_000, 1);
        states[0].record(2000);
        agg.sample(start + Duration::from_secs(2), false);
        states[0].record(10);
        let snap = agg.sample(start + Duration::from_secs(2) + Duration::from_millis(5), false);
        assert!((snap.speed - 1000.0).abs() < 1e-9);
        assert_eq!(snap.downloaded, 2010);
    }

    #[test]
    fn in_flight_percent_never_reaches_hundred() {
        let (states, mut agg, start) = setup(100, 1);
        states[0].record(100);
        let snap = agg.sample(start + Duration::from_secs(1), false);
        assert!(snap.percent < 100.0);
        assert_eq!(snap.percent, IN_FLIGHT_PERCENT_CAP);

        states[0].mark_complete();
        let done = agg.sample(start + Duration::from_secs(2), true);
        assert_eq!(done.percent, 100.0);
        assert!(done.finished);
        assert!(done.workers[0].complete);
    }

    #[test]
    fn zero_size_resource() {
        let (states, mut agg, start) = setup(0, 4);
        assert_eq!(agg.sample(start, false).percent, 0.0);
        states.iter().for_each(|s| s.mark_complete());
        let done = agg.sample(start + Duration::from_millis(1), true);
        assert_eq!(done.percent, 100.0);
        assert_eq!(done.downloaded, 0);
    }
}

use std::num::NonZeroU32;
use std::time::Duration;

pub const MIN_CHUNK_SIZE: usize = 1024;
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// When the progress callback is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// Once per aggregation tick, plus the final snapshot.
    #[default]
    Interval,
    /// Additionally after chunk writes. Bursts of chunks between two
    /// coordinator wake-ups are coalesced into one invocation.
    PerChunk,
}

/// Engine tunables shared by every job a coordinator runs.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Size of each positional write; clamped to `MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE`.
    pub chunk_size: usize,
    pub tick_interval: Duration,
    pub report: ReportMode,
    /// Global bandwidth cap in bytes per second, shared by all workers.
    pub rate_limit: Option<NonZeroU32>,
    pub user_agent: String,
    pub connect_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            tick_interval: Duration::from_secs(1),
            report: ReportMode::Interval,
            rate_limit: None,
            user_agent: concat!("segdl/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl DownloadConfig {
    /// Worker count used when the caller does not pick one.
    pub fn default_worker_count() -> usize {
        num_cpus::get().max(1)
    }

    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_report(mut self, report: ReportMode) -> Self {
        self.report = report;
        self
    }

    pub fn with_rate_limit(mut self, bytes_per_sec: Option<NonZeroU32>) -> Self {
        self.rate_limit = bytes_per_sec;
        self
    }
}

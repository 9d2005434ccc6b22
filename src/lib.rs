//! Segmented HTTP downloader.
//!
//! A [`DownloadCoordinator`] probes the resource size, splits it into one
//! [`ByteRange`] per worker, fetches the ranges concurrently into disjoint
//! windows of a pre-sized destination file, and reports aggregated
//! [`ProgressSnapshot`]s to an optional callback.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod logging;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod storage;
pub mod transport;
pub mod utils;
pub mod worker;

pub use config::{DownloadConfig, ReportMode};
pub use coordinator::{DownloadCoordinator, DownloadReport};
pub use error::{DownloadError, SegmentError, TransportError};
pub use job::{DownloadJob, ProgressCallback};
pub use planner::{plan, ByteRange};
pub use probe::{ProbeInfo, SizeProber};
pub use progress::{ProgressAggregator, ProgressSnapshot, WorkerProgress, WorkerState};
pub use storage::{DestinationFile, SegmentWindow};
pub use transport::{BodyStream, HttpTransport, RangeResponse, RangeTransport};
pub use worker::{SegmentWorker, Throttle};
pub use tokio_util::sync::CancellationToken;

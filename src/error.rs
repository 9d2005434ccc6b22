//! Error types for the download engine.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

use crate::planner::ByteRange;

/// Failure reported by the HTTP collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single segment worker.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("server answered {status}")]
    ResourceUnavailable { status: StatusCode },

    /// The range request never got a response.
    #[error("request failed: {0}")]
    RequestFailed(#[source] TransportError),

    #[error("server ignored the range request and sent the whole resource")]
    RangeIgnored,

    #[error("transfer interrupted: {0}")]
    TransferInterrupted(#[source] TransportError),

    /// Body ended before the window was filled.
    #[error("transfer interrupted: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("cancelled")]
    Cancelled,

    /// The worker task panicked or was aborted by the runtime.
    #[error("worker task aborted: {0}")]
    Aborted(String),
}

impl SegmentError {
    /// True when the segment's request was refused or never answered.
    pub fn is_resource_unavailable(&self) -> bool {
        matches!(
            self,
            SegmentError::ResourceUnavailable { .. } | SegmentError::RequestFailed(_)
        )
    }

    /// True for network-side failures mid-stream (as opposed to disk or status errors).
    pub fn is_transfer_interrupted(&self) -> bool {
        matches!(
            self,
            SegmentError::TransferInterrupted(_) | SegmentError::Truncated { .. }
        )
    }
}

/// Job-level failure returned by [`crate::DownloadCoordinator::run`].
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid download job: {0}")]
    InvalidJob(String),

    #[error("resource unavailable: {reason}")]
    ResourceUnavailable { reason: String },

    #[error("server did not advertise a content length")]
    SizeUnknown,

    #[error("destination {} unusable: {source}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {worker} ({range}) failed: {source}")]
    Segment {
        worker: usize,
        range: ByteRange,
        incomplete: Vec<ByteRange>,
        #[source]
        source: SegmentError,
    },

    #[error("download cancelled")]
    Cancelled { incomplete: Vec<ByteRange> },
}

impl DownloadError {
    /// Byte ranges of the destination known not to have been written.
    ///
    /// Empty for errors raised before any worker was launched.
    pub fn incomplete_ranges(&self) -> &[ByteRange] {
        match self {
            DownloadError::Segment { incomplete, .. } | DownloadError::Cancelled { incomplete } => {
                incomplete
            }
            _ => &[],
        }
    }

    /// The planned range of the worker whose failure ended the job.
    pub fn failed_range(&self) -> Option<ByteRange> {
        match self {
            DownloadError::Segment { range, .. } => Some(*range),
            _ => None,
        }
    }
}

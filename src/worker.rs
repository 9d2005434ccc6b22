//! One concurrent task per planned byte range.

use futures::StreamExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::SegmentError;
use crate::planner::ByteRange;
use crate::progress::WorkerState;
use crate::storage::SegmentWindow;
use crate::transport::RangeTransport;

/// Fetches one byte range and streams it into its window of the destination.
pub struct SegmentWorker {
    pub index: usize,
    pub range: ByteRange,
    pub url: Url,
    pub destination: PathBuf,
    pub transport: Arc<dyn RangeTransport>,
    pub state: Arc<WorkerState>,
    pub chunk_size: usize,
    pub throttle: Option<Arc<Throttle>>,
    /// Signalled after every chunk write when per-chunk reporting is on.
    pub chunk_notify: Option<Arc<Notify>>,
    pub cancel: CancellationToken,
}

impl SegmentWorker {
    pub async fn run(self) -> Result<(), SegmentError> {
        if self.range.is_empty() {
            tracing::debug!(worker = self.index, "empty range, nothing to fetch");
            self.state.mark_complete();
            return Ok(());
        }

        tracing::debug!(worker = self.index, range = %self.range, "segment started");

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SegmentError::Cancelled),
            response = self.transport.get(&self.url, Some(self.range)) => {
                response.map_err(SegmentError::RequestFailed)?
            }
        };

        match response.status {
            StatusCode::PARTIAL_CONTENT => {}
            // Without range support the body starts at offset 0; only the window
            // that also starts there can use it.
            StatusCode::OK if self.range.start == 0 => {}
            StatusCode::OK => return Err(SegmentError::RangeIgnored),
            status => return Err(SegmentError::ResourceUnavailable { status }),
        }

        let mut window = SegmentWindow::open(&self.destination, self.range)
            .await
            .map_err(SegmentError::WriteFailed)?;
        let mut body = response.body;
        let mut buffer: Vec<u8> = Vec::with_capacity(self.chunk_size);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(worker = self.index, written = window.written(), "segment cancelled");
                    return Err(SegmentError::Cancelled);
                }
                next = body.next() => next,
            };

            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return Err(SegmentError::TransferInterrupted(e)),
                None => break,
            };

            let room = (window.remaining() as usize).saturating_sub(buffer.len());
            if bytes.len() > room {
                tracing::warn!(
                    worker = self.index,
                    extra = bytes.len() - room,
                    "server sent more than the requested range, discarding the rest"
                );
            }

            let mut data = &bytes[..bytes.len().min(room)];
            while !data.is_empty() {
                let take = (self.chunk_size - buffer.len()).min(data.len());
                buffer.extend_from_slice(&data[..take]);
                data = &data[take..];
                if buffer.len() == self.chunk_size {
                    self.write_chunk(&mut window, &mut buffer).await?;
                }
            }

            if window.remaining() == buffer.len() as u64 {
                break;
            }
        }
        // Body dropped here, releasing the connection even if it was not exhausted.
        drop(body);

        if !buffer.is_empty() {
            self.write_chunk(&mut window, &mut buffer).await?;
        }

        let received = window.finish().await.map_err(SegmentError::WriteFailed)?;
        if received != self.range.len() {
            return Err(SegmentError::Truncated {
                expected: self.range.len(),
                received,
            });
        }

        self.state.mark_complete();
        tracing::debug!(worker = self.index, range = %self.range, "segment complete");
        Ok(())
    }

    async fn write_chunk(&self, window: &mut SegmentWindow, buffer: &mut Vec<u8>) -> Result<(), SegmentError> {
        if let Some(throttle) = &self.throttle {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(worker = self.index, written = window.written(), "segment cancelled while throttled");
                    return Err(SegmentError::Cancelled);
                }
                _ = throttle.admit(buffer.len()) => {}
            }
        }

        window.write_chunk(&buffer[..]).await.map_err(SegmentError::WriteFailed)?;
        self.state.record(buffer.len() as u64);
        buffer.clear();

        if let Some(notify) = &self.chunk_notify {
            notify.notify_one();
        }
        Ok(())
    }
}

/// Global bandwidth cap shared by every worker of a job.
pub struct Throttle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    burst: NonZeroU32,
}

impl Throttle {
    pub fn per_second(bytes_per_sec: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(bytes_per_sec)),
            burst: bytes_per_sec,
        }
    }

    /// Waits until `len` bytes are admitted, in steps no larger than the burst.
    pub async fn admit(&self, len: usize) {
        let mut remaining = u32::try_from(len).unwrap_or(u32::MAX);
        while let Some(step) = NonZeroU32::new(remaining.min(self.burst.get())) {
            // step <= burst, so capacity is always sufficient
            let _ = self.limiter.until_n_ready(step).await;
            remaining -= step.get();
        }
    }
}

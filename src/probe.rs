use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE};
use reqwest::StatusCode;
use std::sync::Arc;
use url::Url;

use crate::error::DownloadError;
use crate::transport::RangeTransport;

/// What the metadata probe learned about the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeInfo {
    pub total_size: u64,
    pub accepts_ranges: bool,
}

/// Learns the size of the resource without downloading its body.
pub struct SizeProber {
    transport: Arc<dyn RangeTransport>,
}

impl SizeProber {
    pub fn new(transport: Arc<dyn RangeTransport>) -> Self {
        Self { transport }
    }

    pub async fn probe(&self, url: &Url) -> Result<ProbeInfo, DownloadError> {
        let response = self
            .transport
            .get(url, None)
            .await
            .map_err(|e| DownloadError::ResourceUnavailable {
                reason: format!("probe request to {} failed: {}", url, e),
            })?;

        let status = response.status;
        let headers = response.headers;
        // Dropping the body here closes the probe connection unread.
        drop(response.body);

        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(DownloadError::ResourceUnavailable {
                reason: format!("{} answered {}", url, status),
            });
        }

        let total_size = content_range_total(&headers)
            .or_else(|| content_length(&headers))
            .ok_or(DownloadError::SizeUnknown)?;
        let accepts_ranges = status == StatusCode::PARTIAL_CONTENT || advertises_byte_ranges(&headers);

        tracing::debug!(%url, total_size, accepts_ranges, "probed resource");
        Ok(ProbeInfo { total_size, accepts_ranges })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, CONTENT_LENGTH)?.parse().ok()
}

/// Total from `Content-Range: bytes 0-99/1000`; `None` for `*` or malformed values.
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = header_str(headers, CONTENT_RANGE)?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

fn advertises_byte_ranges(headers: &HeaderMap) -> bool {
    header_str(headers, ACCEPT_RANGES)
        .map(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
        .unwrap_or(false)
}

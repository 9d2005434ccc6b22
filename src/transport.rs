//! HTTP collaborator: range-bounded GET with a streamed body.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::config::DownloadConfig;
use crate::error::TransportError;
use crate::planner::ByteRange;

pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Response head plus a body that has not been read yet.
///
/// Dropping the value releases the underlying connection.
pub struct RangeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

#[async_trait]
pub trait RangeTransport: Send + Sync {
    /// Issues a GET for `url`, bounded by `range` when one is given.
    async fn get(&self, url: &Url, range: Option<ByteRange>) -> Result<RangeResponse, TransportError>;
}

/// [`RangeTransport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &DownloadConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RangeTransport for HttpTransport {
    async fn get(&self, url: &Url, range: Option<ByteRange>) -> Result<RangeResponse, TransportError> {
        let mut request = self.client.get(url.clone());
        if let Some(value) = range.and_then(|r| r.header_value()) {
            request = request.header(RANGE, value);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(RangeResponse { status, headers, body })
    }
}

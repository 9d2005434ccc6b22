#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE};
use reqwest::StatusCode;
use segdl::{ByteRange, ProgressSnapshot, RangeResponse, RangeTransport, TransportError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const TEST_URL: &str = "http://files.test/resource.bin";

pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// How the body of the range starting at a given offset misbehaves.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Stream errors after this many bytes.
    ResetAfter(u64),
    /// Stream ends cleanly after this many bytes.
    EndAfter(u64),
    /// Stream delivers this many bytes and then never finishes.
    HangAfter(u64),
    /// The request itself fails before any response arrives.
    Refuse,
}

/// In-memory stand-in for the HTTP collaborator.
pub struct MemoryTransport {
    content: Bytes,
    pub accepts_ranges: bool,
    pub honours_ranges: bool,
    pub advertise_length: bool,
    pub probe_status: StatusCode,
    pub piece: usize,
    pub delay: Option<Duration>,
    faults: HashMap<u64, Fault>,
    on_range_request: Option<Box<dyn Fn() + Send + Sync>>,
    requests: Mutex<Vec<Option<ByteRange>>>,
}

impl MemoryTransport {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content: Bytes::from(content),
            accepts_ranges: true,
            honours_ranges: true,
            advertise_length: true,
            probe_status: StatusCode::OK,
            piece: 4096,
            delay: None,
            faults: HashMap::new(),
            on_range_request: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fault(mut self, range_start: u64, fault: Fault) -> Self {
        self.faults.insert(range_start, fault);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Runs `hook` whenever a worker requests a range, before answering.
    pub fn with_range_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_range_request = Some(Box::new(hook));
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Ranges requested by workers, in arrival order (probe excluded).
    pub fn range_requests(&self) -> Vec<ByteRange> {
        self.requests.lock().unwrap().iter().flatten().copied().collect()
    }

    pub fn probe_count(&self) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.is_none()).count()
    }

    fn body(&self, slice: Bytes, fault: Option<Fault>) -> segdl::BodyStream {
        let limit = match fault {
            Some(Fault::ResetAfter(n)) | Some(Fault::EndAfter(n)) | Some(Fault::HangAfter(n)) => {
                (n as usize).min(slice.len())
            }
            Some(Fault::Refuse) | None => slice.len(),
        };

        let mut items: Vec<Result<Bytes, TransportError>> = Vec::new();
        let mut offset = 0;
        while offset < limit {
            let end = (offset + self.piece).min(limit);
            items.push(Ok(slice.slice(offset..end)));
            offset = end;
        }
        if let Some(Fault::ResetAfter(_)) = fault {
            items.push(Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))));
        }

        let delay = self.delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            item
        });

        match fault {
            Some(Fault::HangAfter(_)) => stream.chain(futures::stream::pending()).boxed(),
            _ => stream.boxed(),
        }
    }
}

#[async_trait]
impl RangeTransport for MemoryTransport {
    async fn get(&self, _url: &Url, range: Option<ByteRange>) -> Result<RangeResponse, TransportError> {
        self.requests.lock().unwrap().push(range);
        let total = self.content.len() as u64;
        let mut headers = HeaderMap::new();

        let Some(range) = range else {
            if self.advertise_length {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(total));
            }
            if self.accepts_ranges {
                headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            }
            let body = if self.probe_status.is_success() {
                self.body(self.content.clone(), None)
            } else {
                futures::stream::empty().boxed()
            };
            return Ok(RangeResponse {
                status: self.probe_status,
                headers,
                body,
            });
        };

        if let Some(hook) = &self.on_range_request {
            hook();
        }
        if let Some(Fault::Refuse) = self.faults.get(&range.start) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        if !self.honours_ranges {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(total));
            return Ok(RangeResponse {
                status: StatusCode::OK,
                headers,
                body: self.body(self.content.clone(), None),
            });
        }

        let slice = self.content.slice(range.start as usize..range.end as usize);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(slice.len() as u64));
        if let Some(last) = range.last() {
            let value = format!("bytes {}-{}/{}", range.start, last, total);
            headers.insert(CONTENT_RANGE, HeaderValue::from_str(&value).unwrap());
        }
        Ok(RangeResponse {
            status: StatusCode::PARTIAL_CONTENT,
            headers,
            body: self.body(slice, self.faults.get(&range.start).copied()),
        })
    }
}

/// Collects every snapshot handed to the progress callback.
#[derive(Clone, Default)]
pub struct Recorder {
    snapshots: Arc<Mutex<Vec<ProgressSnapshot>>>,
}

impl Recorder {
    pub fn callback(&self) -> impl Fn(&ProgressSnapshot) + Send + Sync + 'static {
        let snapshots = self.snapshots.clone();
        move |snapshot: &ProgressSnapshot| snapshots.lock().unwrap().push(snapshot.clone())
    }

    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn hundred_percent_count(&self) -> usize {
        self.snapshots().iter().filter(|s| s.percent == 100.0).count()
    }
}

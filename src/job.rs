use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::error::DownloadError;
use crate::progress::ProgressSnapshot;

/// Progress observer. Always invoked from the coordinator task, never from
/// workers, so calls are sequential.
pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// What to download, where to, and with how many workers.
#[derive(Clone)]
pub struct DownloadJob {
    url: Url,
    destination: PathBuf,
    worker_count: usize,
    progress: Option<ProgressCallback>,
}

impl DownloadJob {
    pub fn new(url: &str, destination: impl Into<PathBuf>, worker_count: usize) -> Result<Self, DownloadError> {
        let url = Url::parse(url).map_err(|e| DownloadError::InvalidJob(format!("bad url {:?}: {}", url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidJob(format!(
                "unsupported scheme {:?}",
                url.scheme()
            )));
        }
        if worker_count == 0 {
            return Err(DownloadError::InvalidJob("worker count must be at least 1".into()));
        }

        Ok(Self {
            url,
            destination: destination.into(),
            worker_count,
            progress: None,
        })
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn progress(&self) -> Option<&ProgressCallback> {
        self.progress.as_ref()
    }
}

impl fmt::Debug for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadJob")
            .field("url", &self.url.as_str())
            .field("destination", &self.destination)
            .field("worker_count", &self.worker_count)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

//! Destination file, pre-sized and split into per-worker write windows.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::planner::ByteRange;

/// The assembled output file.
pub struct DestinationFile {
    file: File,
    path: PathBuf,
}

impl DestinationFile {
    /// Creates (or truncates) `path` and sizes it to `total_size` bytes so
    /// workers can write their windows in any order.
    pub async fn prepare(path: &Path, total_size: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await?;
        file.set_len(total_size).await?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn sync(&self) -> io::Result<()> {
        self.file.sync_all().await
    }
}

/// Write access to exactly one byte range of the destination file.
pub struct SegmentWindow {
    file: File,
    range: ByteRange,
    written: u64,
}

impl SegmentWindow {
    /// Opens a writer restricted to `range` of the prepared file at `path`.
    /// Each window owns its own handle and cursor, so windows never contend on a lock.
    pub async fn open(path: &Path, range: ByteRange) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).open(path).await?;
        Ok(Self {
            file,
            range,
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn remaining(&self) -> u64 {
        self.range.len() - self.written
    }

    /// Absolute file offset the next chunk lands at.
    pub fn position(&self) -> u64 {
        self.range.start + self.written
    }

    /// Writes `data` at the running offset. Refuses any write that would cross
    /// the end of the window.
    pub async fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() as u64 > self.remaining() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} byte write at offset {} overflows window {}",
                    data.len(),
                    self.position(),
                    self.range
                ),
            ));
        }

        self.file.seek(SeekFrom::Start(self.position())).await?;
        self.file.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Flushes buffered writes. Must be called before the window is dropped.
    pub async fn finish(mut self) -> io::Result<u64> {
        self.file.flush().await?;
        Ok(self.written)
    }
}

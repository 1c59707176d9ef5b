//! Clip fetcher
//!
//! Downloads one clip from the clips bucket to its local path. A clip whose
//! local file already exists is trusted as complete and not fetched again;
//! bytes are streamed to `<file>.part` and renamed into place only after the
//! body has been fully written, so an interrupted download is never trusted.

use crate::layout::ensure_dir;
use crate::storage::ObjectStore;
use crate::utils::retry_with_backoff;
use cvb_common::Result;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Outcome of a successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Bytes written to the local file
    Downloaded(u64),
    /// Local file existed; nothing was fetched
    AlreadyPresent,
}

/// Fetches clips from one bucket
#[derive(Clone)]
pub struct ClipFetcher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    attempts: u32,
    backoff_ms: u64,
}

impl ClipFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            attempts: 1,
            backoff_ms: 0,
        }
    }

    /// Retry failed downloads up to `attempts` times in total
    pub fn with_retry(mut self, attempts: u32, backoff_ms: u64) -> Self {
        self.attempts = attempts.max(1);
        self.backoff_ms = backoff_ms;
        self
    }

    pub async fn fetch(&self, remote_key: &str, local_path: &Path) -> Result<FetchStatus> {
        if tokio::fs::try_exists(local_path).await? {
            tracing::debug!(path = %local_path.display(), "Clip already present, skipping");
            return Ok(FetchStatus::AlreadyPresent);
        }

        if let Some(parent) = local_path.parent() {
            ensure_dir(parent).await?;
        }

        let bytes = retry_with_backoff("clip download", self.attempts, self.backoff_ms, || {
            self.download(remote_key, local_path)
        })
        .await?;

        Ok(FetchStatus::Downloaded(bytes))
    }

    async fn download(&self, remote_key: &str, local_path: &Path) -> Result<u64> {
        let part = part_path(local_path);
        let result = self.stream_to(remote_key, &part).await;

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&part, local_path).await?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn stream_to(&self, remote_key: &str, part: &Path) -> Result<u64> {
        let mut body = self.store.get(&self.bucket, remote_key).await?;
        let mut file = tokio::fs::File::create(part).await?;
        let mut bytes = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(bytes)
    }
}

/// Temporary download location next to the final file
fn part_path(local_path: &Path) -> PathBuf {
    let mut name = local_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

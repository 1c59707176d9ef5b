//! Directory-backed object store
//!
//! `<root>/<bucket>/<key>`. Used for local dry runs and tests.

use super::{ByteStream, ObjectStore};
use async_trait::async_trait;
use cvb_common::{Error, Result};
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Filesystem location of an object
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let path = self.object_path(bucket, key);
        let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::Storage(format!("Object not found: {}/{}", bucket, key)),
            _ => Error::Io(e),
        })?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn put(&self, bucket: &str, key: &str, mut body: ByteStream) -> Result<()> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never see a partially written object
        let mut staging = path.clone().into_os_string();
        staging.push(".upload");
        let staging = PathBuf::from(staging);

        let mut file = tokio::fs::File::create(&staging).await?;
        let written = async {
            while let Some(chunk) = body.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                tokio::fs::rename(&staging, &path).await?;
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                Err(Error::Io(e))
            }
        }
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<u64> {
        let path = self.object_path(bucket, key);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::Storage(format!("Object not found: {}/{}", bucket, key)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

//! Remote object storage
//!
//! The pipeline reads clips from, and writes archives to, an `ObjectStore`.
//! Bodies move as byte streams in both directions so neither a clip nor an
//! archive is ever held in memory whole.

pub mod fs;
pub mod http;

pub use fs::FsObjectStore;
pub use http::HttpObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use cvb_common::config::{StorageConfig, StorageKind};
use cvb_common::Result;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Streamed object body
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Minimal object storage surface used by the bundler
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream an object's bytes
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream>;

    /// Upload a stream as a publicly readable object
    async fn put(&self, bucket: &str, key: &str, body: ByteStream) -> Result<()>;

    /// Object size in bytes (metadata-only request)
    async fn head(&self, bucket: &str, key: &str) -> Result<u64>;
}

/// Wrap the receiving half of a chunk channel as a ByteStream
pub fn channel_stream(rx: mpsc::Receiver<std::io::Result<Bytes>>) -> ByteStream {
    Box::pin(ReceiverStream::new(rx))
}

/// Build the store described by the configuration
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    Ok(match config.kind {
        StorageKind::Http => Arc::new(HttpObjectStore::new(config)?),
        StorageKind::Filesystem => Arc::new(FsObjectStore::new(&config.endpoint)),
    })
}

//! Locale archive upload
//!
//! Each locale directory is packed as tar+gzip on a blocking task and the
//! compressed bytes are streamed through a bounded channel straight into
//! `ObjectStore::put`. No archive file is written locally. Locales are
//! processed one at a time; a failed locale is recorded and the rest continue.

use crate::layout::OutputLayout;
use crate::storage::{channel_stream, ObjectStore};
use bytes::Bytes;
use cvb_common::events::{BundleEvent, EventBus};
use cvb_common::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Compressed chunk size handed to the uploader
const CHUNK_SIZE: usize = 64 * 1024;
/// Chunks buffered between archiver and uploader
const CHUNK_BUFFER: usize = 8;

/// Object key of a locale archive
pub fn archive_key(release: &str, locale: &str) -> String {
    format!("{}/{}.tar.gz", release, locale)
}

/// A locale whose archive could not be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub locale: String,
    pub message: String,
}

/// Result of uploading every locale
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Archive size reported by storage, per uploaded locale
    pub sizes: BTreeMap<String, u64>,
    pub failures: Vec<UploadFailure>,
}

/// Packs and uploads locale directories
pub struct Archiver {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    release: String,
    layout: OutputLayout,
    events: EventBus,
}

impl Archiver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        release: impl Into<String>,
        layout: OutputLayout,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            release: release.into(),
            layout,
            events,
        }
    }

    /// Upload every locale in order, collecting failures
    pub async fn upload_all(&self, locales: &[String]) -> UploadReport {
        let mut report = UploadReport::default();

        for locale in locales {
            match self.upload_locale(locale).await {
                Ok(size) => {
                    tracing::info!(locale = %locale, size, "Locale archive uploaded");
                    self.events.emit_lossy(BundleEvent::UploadFinished {
                        locale: locale.clone(),
                        size,
                    });
                    report.sizes.insert(locale.clone(), size);
                }
                Err(e) => {
                    tracing::error!(locale = %locale, error = %e, "Locale archive upload failed");
                    self.events.emit_lossy(BundleEvent::UploadFailed {
                        locale: locale.clone(),
                        message: e.to_string(),
                    });
                    report.failures.push(UploadFailure {
                        locale: locale.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Stream one locale archive to storage; returns the stored size
    pub async fn upload_locale(&self, locale: &str) -> Result<u64> {
        let dir = self.layout.locale_dir(locale);
        if !dir.is_dir() {
            return Err(Error::Archive(format!(
                "locale directory missing: {}",
                dir.display()
            )));
        }

        let key = archive_key(&self.release, locale);
        tracing::info!(locale = %locale, key = %key, "Uploading locale archive");

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        let entry_root = locale.to_string();
        let producer = tokio::task::spawn_blocking(move || write_archive(&dir, &entry_root, tx));

        let events = self.events.clone();
        let progress_locale = locale.to_string();
        let mut uploaded = 0u64;
        let body = channel_stream(rx).inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                uploaded += chunk.len() as u64;
                events.emit_lossy(BundleEvent::UploadProgress {
                    locale: progress_locale.clone(),
                    bytes: uploaded,
                });
            }
        });

        let upload = self.store.put(&self.bucket, &key, Box::pin(body)).await;
        let archived = producer
            .await
            .map_err(|e| Error::Internal(format!("Archive task failed: {}", e)))?;

        upload?;
        archived?;

        self.store.head(&self.bucket, &key).await
    }
}

/// Write `<dir>` as `<entry_root>/...` into the chunk channel
///
/// Runs on a blocking thread. A failure is also pushed into the channel so
/// the upload fails instead of storing a truncated archive.
fn write_archive(dir: &Path, entry_root: &str, tx: mpsc::Sender<io::Result<Bytes>>) -> Result<()> {
    let writer = ChannelWriter::new(tx.clone());
    let result = build_archive(dir, entry_root, writer);

    if let Err(e) = &result {
        let _ = tx.blocking_send(Err(io::Error::new(e.kind(), e.to_string())));
    }
    result.map_err(|e| Error::Archive(format!("{}: {}", dir.display(), e)))
}

fn build_archive(dir: &Path, entry_root: &str, writer: ChannelWriter) -> io::Result<()> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(entry_root, dir)?;
    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()
}

/// `Write` adapter that forwards fixed-size chunks into a channel
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buffer: Vec<u8>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buffer: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(CHUNK_SIZE),
        ));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "upload stream closed"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = CHUNK_SIZE - self.buffer.len();
        let n = room.min(buf.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() >= CHUNK_SIZE {
            self.send_buffer()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ByteStream, FsObjectStore};
    use async_trait::async_trait;
    use flate2::read::GzDecoder;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn populate(out: &Path, locale: &str, clips: usize) {
        let clips_dir = out.join(locale).join("clips");
        std::fs::create_dir_all(&clips_dir).unwrap();
        for i in 0..clips {
            std::fs::write(
                clips_dir.join(format!("common_voice_{}_{}.mp3", locale, i)),
                vec![i as u8; 1000],
            )
            .unwrap();
        }
        std::fs::write(out.join(locale).join("validated.tsv"), "header\nrow\n").unwrap();
    }

    /// Filesystem store that rejects uploads whose key contains `reject`
    struct RejectingStore {
        inner: FsObjectStore,
        reject: &'static str,
    }

    #[async_trait]
    impl ObjectStore for RejectingStore {
        async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
            self.inner.get(bucket, key).await
        }

        async fn put(&self, bucket: &str, key: &str, body: ByteStream) -> Result<()> {
            if key.contains(self.reject) {
                return Err(Error::Storage("503 Slow Down".to_string()));
            }
            self.inner.put(bucket, key, body).await
        }

        async fn head(&self, bucket: &str, key: &str) -> Result<u64> {
            self.inner.head(bucket, key).await
        }
    }

    #[tokio::test]
    async fn test_upload_locale_streams_valid_archive() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out");
        populate(&out, "en", 3);
        let remote = FsObjectStore::new(temp_dir.path().join("remote"));
        let events = EventBus::new(1000);
        let mut rx = events.subscribe();

        let archiver = Archiver::new(
            Arc::new(remote.clone()),
            "bundles",
            "cv-1",
            OutputLayout::new(&out),
            events,
        );
        let size = archiver.upload_locale("en").await.unwrap();

        let archive_path = remote.object_path("bundles", "cv-1/en.tar.gz");
        assert_eq!(std::fs::metadata(&archive_path).unwrap().len(), size);

        let mut archive = tar::Archive::new(GzDecoder::new(std::fs::File::open(&archive_path).unwrap()));
        let names: BTreeSet<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect();
        assert!(names.contains("en/clips/common_voice_en_0.mp3"));
        assert!(names.contains("en/clips/common_voice_en_2.mp3"));
        assert!(names.contains("en/validated.tsv"));

        // Progress is monotonic
        let mut last = 0;
        while let Ok(event) = rx.try_recv() {
            if let BundleEvent::UploadProgress { bytes, .. } = event {
                assert!(bytes > last);
                last = bytes;
            }
        }
        assert_eq!(last, size);
    }

    #[tokio::test]
    async fn test_upload_all_continues_after_failure() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out");
        populate(&out, "de", 2);
        populate(&out, "fr", 2);
        let store = RejectingStore {
            inner: FsObjectStore::new(temp_dir.path().join("remote")),
            reject: "de.tar.gz",
        };

        let archiver = Archiver::new(
            Arc::new(store),
            "bundles",
            "cv-1",
            OutputLayout::new(&out),
            EventBus::new(100),
        );
        let report = archiver
            .upload_all(&["de".to_string(), "fr".to_string()])
            .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].locale, "de");
        assert!(report.sizes.contains_key("fr"));
        assert!(!report.sizes.contains_key("de"));
    }

    #[tokio::test]
    async fn test_missing_locale_dir_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let archiver = Archiver::new(
            Arc::new(FsObjectStore::new(temp_dir.path())),
            "bundles",
            "cv-1",
            OutputLayout::new(temp_dir.path().join("out")),
            EventBus::new(10),
        );
        assert!(matches!(
            archiver.upload_locale("xx").await,
            Err(Error::Archive(_))
        ));
    }

    #[test]
    fn test_archive_key() {
        assert_eq!(archive_key("cv-corpus-3", "ga-IE"), "cv-corpus-3/ga-IE.tar.gz");
    }
}

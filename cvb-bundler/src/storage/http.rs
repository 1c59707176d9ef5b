//! S3-compatible HTTP object store
//!
//! Path-style addressing: `<endpoint>/<bucket>/<key>`. Uploads are sent
//! with chunked transfer encoding and `x-amz-acl: public-read`.
//!
//! Only connection setup is bounded by a timeout. A multi-GB archive upload
//! or a slow clip download runs for as long as the transfer takes.

use super::{channel_stream, ByteStream, ObjectStore};
use async_trait::async_trait;
use cvb_common::config::StorageConfig;
use cvb_common::{Error, Result};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::sync::mpsc;

const USER_AGENT: &str = concat!("cvb-bundler/", env!("CARGO_PKG_VERSION"));

/// Chunks buffered between the response reader task and the consumer
const CHUNK_BUFFER: usize = 16;

/// Object store over plain HTTP(S)
pub struct HttpObjectStore {
    http_client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Storage(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let url = self.object_url(bucket, key);
        tracing::debug!(url = %url, "GET object");

        let mut response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| Error::Storage(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::Storage(format!("Object not found: {}/{}", bucket, key)));
        }
        if !status.is_success() {
            return Err(Error::Storage(format!("GET {} returned {}", url, status)));
        }

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        tokio::spawn(async move {
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        if tx.send(Ok(chunk)).await.is_err() {
                            // Consumer dropped the stream
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(channel_stream(rx))
    }

    async fn put(&self, bucket: &str, key: &str, body: ByteStream) -> Result<()> {
        let url = self.object_url(bucket, key);
        tracing::debug!(url = %url, "PUT object");

        let response = self
            .authorize(self.http_client.put(&url))
            .header("x-amz-acl", "public-read")
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| Error::Storage(format!("PUT {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Storage(format!(
                "PUT {} returned {}: {}",
                url, status, error_text
            )));
        }
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<u64> {
        let url = self.object_url(bucket, key);

        let response = self
            .authorize(self.http_client.head(&url))
            .send()
            .await
            .map_err(|e| Error::Storage(format!("HEAD {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Storage(format!(
                "HEAD {} returned {}",
                url,
                response.status()
            )));
        }

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| Error::Storage(format!("HEAD {} has no Content-Length", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_object_url_path_style() {
        let config = StorageConfig {
            endpoint: "https://storage.example.org/".to_string(),
            ..Default::default()
        };
        let store = HttpObjectStore::new(&config).unwrap();
        assert_eq!(
            store.object_url("clips", "/abc/1.mp3"),
            "https://storage.example.org/clips/abc/1.mp3"
        );
    }

    /// Accept one request, read it through the final chunk, answer 200
    async fn accept_chunked_put(listener: TcpListener) -> Vec<u8> {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the body ended");
            request.extend_from_slice(&buf[..n]);
            let header_end = request.windows(4).position(|w| w == b"\r\n\r\n");
            if let Some(end) = header_end {
                if request[end + 4..].ends_with(b"\r\n0\r\n\r\n") {
                    break;
                }
            }
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
            .await
            .unwrap();
        request
    }

    #[tokio::test]
    async fn test_slow_upload_outlives_connect_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(accept_chunked_put(listener));

        let config = StorageConfig {
            endpoint: format!("http://{}", addr),
            connect_timeout_secs: 1,
            ..Default::default()
        };
        let store = HttpObjectStore::new(&config).unwrap();

        // Body trickles in over well past the connect timeout
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_millis(600)).await;
                if tx.send(Ok(Bytes::from(vec![b'x'; 1024]))).await.is_err() {
                    break;
                }
            }
        });

        store
            .put("bundles", "r/en.tar.gz", channel_stream(rx))
            .await
            .unwrap();

        let request = server.await.unwrap();
        let text = String::from_utf8_lossy(&request);
        assert!(text.starts_with("PUT /bundles/r/en.tar.gz HTTP/1.1\r\n"));
        assert!(text.to_ascii_lowercase().contains("x-amz-acl: public-read"));
        let body_start = request.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let payload = request[body_start..].iter().filter(|b| **b == b'x').count();
        assert_eq!(payload, 4 * 1024);
    }
}

//! HTTP client for streaming downloads.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use log::debug;
use reqwest::Client;
use std::io::Write;

/// Thin wrapper around a reqwest Client.
///
/// Every request is attempted exactly once; a failed download surfaces to
/// the operator instead of being retried.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// A client identifying itself as hpcbuild.
    pub fn with_default_client() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("hpcbuild/", env!("HPCBUILD_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(client))
    }

    /// Streams the body at `url` into the writer produced by `create_writer`.
    /// The writer is only created once the server has answered with success.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: FnOnce() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to start download request")?
            .error_for_status()
            .context("Server rejected download request")?;

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read chunk from download stream")?;
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Writer that appends into a shared buffer so tests can inspect it.
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_download_file_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/openmpi-5.0.8.tar.gz")
            .with_status(200)
            .with_body("tarball bytes")
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);

        let bytes = client
            .download_file(&format!("{}/openmpi-5.0.8.tar.gz", server.url()), move || {
                Ok(SharedBuf(sink))
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 13);
        assert_eq!(buffer.lock().unwrap().as_slice(), b"tarball bytes");
    }

    #[tokio::test]
    async fn test_download_file_not_found_is_attempted_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing.tar.gz")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result = client
            .download_file(
                &format!("{}/missing.tar.gz", server.url()),
                || -> Result<std::io::Sink> {
                    panic!("writer must not be created for a failed response")
                },
            )
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_download_file_server_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky.tar.gz")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result = client
            .download_file(&format!("{}/flaky.tar.gz", server.url()), || {
                Ok(std::io::sink())
            })
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }
}

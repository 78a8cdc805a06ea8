//! Source retrieval: release tarballs over HTTP, development refs via git.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, info};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::http::HttpClient;
use crate::runtime::Runtime;

/// Retrieves sources from the network. Each call is attempted exactly once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Download `url` into the file `dest`.
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;

    /// Shallow clone of `reference` (branch or tag) from `git_url` into `dest`.
    async fn clone_repo(&self, git_url: &str, reference: &str, dest: &Path) -> Result<()>;
}

/// Fetcher backed by reqwest for downloads and the `git` CLI for clones.
pub struct NetworkFetcher<R: Runtime> {
    runtime: R,
    http: HttpClient,
}

impl<R: Runtime> NetworkFetcher<R> {
    pub fn new(runtime: R, http: HttpClient) -> Self {
        Self { runtime, http }
    }
}

#[async_trait]
impl<R: Runtime> SourceFetcher for NetworkFetcher<R> {
    #[tracing::instrument(skip(self))]
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading {}...", url);
        let bytes = self
            .http
            .download_file(url, || {
                self.runtime
                    .create_file(dest)
                    .with_context(|| format!("Failed to create {:?}", dest))
            })
            .await?;
        info!("Download complete ({} bytes).", bytes);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn clone_repo(&self, git_url: &str, reference: &str, dest: &Path) -> Result<()> {
        info!("Cloning {} ({})...", git_url, reference);
        let output = Command::new("git")
            .args(["clone", "--depth", "1", "--branch", reference, git_url])
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .context("Failed to run git")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "git clone of {} at '{}' failed ({}): {}",
                git_url,
                reference,
                output.status,
                stderr.trim()
            );
        }
        debug!("Cloned into {:?}", dest);
        Ok(())
    }
}

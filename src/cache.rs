//! Source archive cache under the source root.
//!
//! A cached `<package>-<version>.tar.gz` is the durable record that a release
//! was built; its presence short-circuits the next download of that version.

use anyhow::{Context, Result, anyhow};
use glob::{Pattern, glob};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::archive::{ARCHIVE_SUFFIXES, ArchiveExtractor, Extractors, archive_suffix, pack_tar_gz};
use crate::fetch::SourceFetcher;
use crate::runtime::Runtime;

/// Where the extracted source tree came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    Cached(PathBuf),
    Downloaded(PathBuf),
}

impl SourceOrigin {
    pub fn archive(&self) -> &Path {
        match self {
            SourceOrigin::Cached(path) | SourceOrigin::Downloaded(path) => path,
        }
    }
}

/// What `archive_and_clean` managed to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub archived: bool,
    pub removed_source: bool,
}

pub struct ArchiveCache<'a, R: Runtime, F: SourceFetcher> {
    runtime: &'a R,
    fetcher: &'a F,
    extractors: Extractors,
    cache_dir: PathBuf,
}

impl<'a, R: Runtime, F: SourceFetcher> ArchiveCache<'a, R, F> {
    pub fn new(runtime: &'a R, fetcher: &'a F, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            fetcher,
            extractors: Extractors::new(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Cached archive for `archive_stem`, preferring formats in `ARCHIVE_SUFFIXES` order.
    pub fn find_cached(&self, archive_stem: &str) -> Result<Option<PathBuf>> {
        let pattern = format!(
            "{}/{}.*",
            Pattern::escape(&self.cache_dir.to_string_lossy()),
            Pattern::escape(archive_stem)
        );
        let mut found = Vec::new();
        for entry in glob(&pattern).context("Invalid cache lookup pattern")? {
            let path = entry?;
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            // `openmpi-5.0.8.*` also matches `openmpi-5.0.8.1.tar.gz`
            match archive_suffix(&name) {
                Some(suffix) if name.len() == archive_stem.len() + suffix.len() => {
                    found.push((rank(suffix), path))
                }
                _ => debug!("Ignoring {:?} in cache lookup", path),
            }
        }
        found.sort();
        Ok(found.into_iter().next().map(|(_, path)| path))
    }

    /// Extract the cached archive for `archive_stem` into `dest`, downloading
    /// it from `url` first when it is not cached.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_or_use(
        &self,
        url: &str,
        archive_stem: &str,
        dest: &Path,
    ) -> Result<SourceOrigin> {
        self.clear(dest)?;

        let origin = match self.find_cached(archive_stem)? {
            Some(archive) => {
                info!("Using cached archive {:?}", archive);
                SourceOrigin::Cached(archive)
            }
            None => SourceOrigin::Downloaded(self.download(url, archive_stem).await?),
        };

        self.extractors
            .extract(self.runtime, origin.archive(), dest)
            .with_context(|| format!("Failed to extract {:?}", origin.archive()))?;
        Ok(origin)
    }

    async fn download(&self, url: &str, archive_stem: &str) -> Result<PathBuf> {
        let file_name = url.rsplit('/').next().unwrap_or(url);
        let file_name = file_name.split(['?', '#']).next().unwrap_or(file_name);
        let suffix = archive_suffix(file_name)
            .ok_or_else(|| anyhow!("Cannot tell the archive format of {}", url))?;

        self.runtime.create_dir_all(&self.cache_dir)?;
        let target = self.cache_dir.join(format!("{}{}", archive_stem, suffix));
        let part = part_path(&target);

        if let Err(e) = self.fetcher.download(url, &part).await {
            if self.runtime.exists(&part) {
                if let Err(cleanup) = self.runtime.remove_file(&part) {
                    warn!("Failed to remove partial download {:?}: {:#}", part, cleanup);
                }
            }
            return Err(e);
        }
        self.runtime.rename(&part, &target)?;
        Ok(target)
    }

    /// Clone `reference` of `git_url` into `dest`. Clones are never cached.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, git_url: &str, reference: &str, dest: &Path) -> Result<()> {
        self.clear(dest)?;
        if let Some(parent) = dest.parent() {
            self.runtime.create_dir_all(parent)?;
        }
        self.fetcher.clone_repo(git_url, reference, dest).await
    }

    /// Pack `source_dir` into `<archive_stem>.tar.gz` and delete it. Never fails:
    /// problems are logged as warnings.
    #[tracing::instrument(skip(self))]
    pub fn archive_and_clean(
        &self,
        source_dir: &Path,
        archive_stem: &str,
        keep_source: bool,
    ) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();
        let archive = self.cache_dir.join(format!("{}.tar.gz", archive_stem));

        match pack_tar_gz(self.runtime, source_dir, &archive, archive_stem) {
            Ok(()) => {
                outcome.archived = true;
                self.drop_other_formats(archive_stem, &archive);
            }
            Err(e) => warn!("Failed to archive {:?}: {:#}", source_dir, e),
        }

        if keep_source {
            debug!("Keeping source tree {:?}", source_dir);
            return outcome;
        }
        match self.runtime.remove_dir_all(source_dir) {
            Ok(()) => outcome.removed_source = true,
            Err(e) => warn!("Failed to remove source tree {:?}: {:#}", source_dir, e),
        }
        outcome
    }

    fn drop_other_formats(&self, archive_stem: &str, keep: &Path) {
        for suffix in ARCHIVE_SUFFIXES {
            let other = self.cache_dir.join(format!("{}{}", archive_stem, suffix));
            if other != keep && self.runtime.exists(&other) {
                if let Err(e) = self.runtime.remove_file(&other) {
                    warn!("Failed to remove superseded archive {:?}: {:#}", other, e);
                }
            }
        }
    }

    fn clear(&self, dest: &Path) -> Result<()> {
        if self.runtime.exists(dest) {
            debug!("Removing stale source tree {:?}", dest);
            self.runtime
                .remove_dir_all(dest)
                .with_context(|| format!("Failed to remove stale {:?}", dest))?;
        }
        Ok(())
    }
}

fn rank(suffix: &str) -> usize {
    ARCHIVE_SUFFIXES
        .iter()
        .position(|s| *s == suffix)
        .unwrap_or(ARCHIVE_SUFFIXES.len())
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

//! Source archive unpacking and packing.
//!
//! Extractors unpack into a scratch directory next to the destination and
//! then promote the contents of a single shared top-level directory, so
//! `openmpi-5.0.8/configure` in the archive lands at `<dest>/configure`.

mod pack;
mod tarball;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use log::debug;
use std::path::{Path, PathBuf};

pub use pack::pack_tar_gz;
pub use tarball::TarExtractor;
pub use zip::ZipExtractor;

/// File name suffixes the extractors understand, in cache preference order.
pub const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz2", ".tar", ".zip",
];

/// Suffix of the archive name in `name`, if it is a supported format.
pub fn archive_suffix(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    ARCHIVE_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix))
        .copied()
}

/// Trait for format-specific archive extractors
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive into `extract_to`, which must not exist yet
    fn extract<R: Runtime>(&self, runtime: &R, archive_path: &Path, extract_to: &Path)
    -> Result<()>;
}

/// Dispatches to the extractor for the archive's format.
#[derive(Default)]
pub struct Extractors {
    tar: TarExtractor,
    zip: ZipExtractor,
}

impl Extractors {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveExtractor for Extractors {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.tar.can_handle(archive_path) || self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        if self.tar.can_handle(archive_path) {
            return self.tar.extract(runtime, archive_path, extract_to);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.extract(runtime, archive_path, extract_to);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

/// Scratch directory used while unpacking into `extract_to`.
fn scratch_dir(extract_to: &Path) -> Result<PathBuf> {
    let name = extract_to
        .file_name()
        .context("Extraction target has no file name")?;
    Ok(extract_to.with_file_name(format!(".{}.unpack", name.to_string_lossy())))
}

/// Move the unpacked tree from `scratch` to `extract_to`, descending into a
/// single top-level directory when the archive has one.
fn promote_single_root<R: Runtime>(runtime: &R, scratch: &Path, extract_to: &Path) -> Result<()> {
    let entries = runtime
        .read_dir(scratch)
        .context("Failed to read scratch extraction directory")?;

    let root = match entries.as_slice() {
        [] => return Err(anyhow!("Archive appears to be empty.")),
        [single] if runtime.is_dir(single) && !runtime.is_symlink(single) => single.clone(),
        _ => scratch.to_path_buf(),
    };

    debug!("Promoting {:?} to {:?}", root, extract_to);
    if let Some(parent) = extract_to.parent() {
        runtime.create_dir_all(parent)?;
    }
    runtime.rename(&root, extract_to)?;
    if runtime.exists(scratch) {
        runtime.remove_dir_all(scratch)?;
    }
    Ok(())
}

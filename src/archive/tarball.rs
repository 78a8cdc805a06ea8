use crate::runtime::{Runtime, is_path_under};
use anyhow::{Context, Result, anyhow};
use bzip2::read::MultiBzDecoder;
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use std::io::Read;
use std::path::Path;
use tar::Archive;
use xz2::read::XzDecoder;

use super::{ArchiveExtractor, promote_single_root, scratch_dir};

/// Compression wrapped around a tar stream, decided by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    fn from_path(archive_path: &Path) -> Option<Self> {
        let name = archive_path.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Compression::Gzip)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Compression::Bzip2)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Compression::Xz)
        } else if name.ends_with(".tar") {
            Some(Compression::None)
        } else {
            None
        }
    }

    fn decoder(self, file: Box<dyn Read + Send>) -> Box<dyn Read> {
        match self {
            Compression::None => file,
            Compression::Gzip => Box::new(GzDecoder::new(file)),
            Compression::Bzip2 => Box::new(MultiBzDecoder::new(file)),
            Compression::Xz => Box::new(XzDecoder::new_multi_decoder(file)),
        }
    }
}

/// Extractor for plain, gzip, bzip2 and xz compressed tar archives
#[derive(Default)]
pub struct TarExtractor;

impl ArchiveExtractor for TarExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        Compression::from_path(archive_path).is_some()
    }

    fn extract<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting tar archive {:?} to {:?}...", archive_path, extract_to);
        let compression = Compression::from_path(archive_path)
            .ok_or_else(|| anyhow!("Not a tar archive: {}", archive_path.display()))?;
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
        let mut archive = Archive::new(compression.decoder(file));
        archive.set_preserve_permissions(true);

        let scratch = scratch_dir(extract_to)?;
        if runtime.exists(&scratch) {
            runtime.remove_dir_all(&scratch)?;
        }
        runtime.create_dir_all(&scratch)?;

        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read tar archive {:?}", archive_path))?
        {
            let mut entry = entry.context("Failed to read tar entry")?;
            let entry_path = entry.path()?.into_owned();
            if !is_path_under(&scratch.join(&entry_path), &scratch) {
                warn!("Skipping tar entry outside the archive root: {:?}", entry_path);
                continue;
            }
            // unpack_in refuses `..` components and absolute paths on its own
            let unpacked = entry
                .unpack_in(&scratch)
                .with_context(|| format!("Failed to extract {:?}", entry_path))?;
            if !unpacked {
                debug!("Skipped tar entry {:?}", entry_path);
            }
        }

        promote_single_root(runtime, &scratch, extract_to)?;
        info!("Extraction complete.");
        Ok(())
    }
}

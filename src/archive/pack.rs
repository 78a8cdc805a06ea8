use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, warn};
use std::path::Path;
use tar::Builder;

/// Compress `source_dir` into `archive_path` as a gzip'd tarball whose
/// entries live under `root_name/`.
///
/// The archive is written to a `.part` file and renamed into place, so a
/// failure never leaves a truncated archive under the final name.
#[tracing::instrument(skip(runtime))]
pub fn pack_tar_gz<R: Runtime>(
    runtime: &R,
    source_dir: &Path,
    archive_path: &Path,
    root_name: &str,
) -> Result<()> {
    let part_path = archive_path.with_file_name(format!(
        "{}.part",
        archive_path
            .file_name()
            .context("Archive path has no file name")?
            .to_string_lossy()
    ));

    let result = write_tar_gz(runtime, source_dir, &part_path, root_name)
        .and_then(|()| runtime.rename(&part_path, archive_path));
    if result.is_err() && runtime.exists(&part_path) {
        if let Err(cleanup) = runtime.remove_file(&part_path) {
            warn!("Failed to remove partial archive {:?}: {:#}", part_path, cleanup);
        }
    }
    result?;

    debug!("Packed {:?} into {:?}", source_dir, archive_path);
    Ok(())
}

fn write_tar_gz<R: Runtime>(
    runtime: &R,
    source_dir: &Path,
    part_path: &Path,
    root_name: &str,
) -> Result<()> {
    let file = runtime.create_file(part_path)?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    // Source trees carry relative symlinks that must survive a round trip
    builder.follow_symlinks(false);
    builder
        .append_dir_all(root_name, source_dir)
        .with_context(|| format!("Failed to add {:?} to archive", source_dir))?;
    builder
        .into_inner()
        .context("Failed to finish tar stream")?
        .finish()
        .context("Failed to finish gzip stream")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveExtractor, TarExtractor};
    use crate::runtime::RealRuntime;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_pack_then_extract_preserves_tree() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("openblas-0.3.28");
        fs::create_dir_all(src.join("interface"))?;
        fs::write(src.join("Makefile"), "all:\n")?;
        fs::write(src.join("interface/gemm.c"), "int x;")?;
        #[cfg(unix)]
        std::os::unix::fs::symlink("Makefile", src.join("GNUmakefile"))?;

        let archive = dir.path().join("openblas-0.3.28.tar.gz");
        pack_tar_gz(&RealRuntime, &src, &archive, "openblas-0.3.28")?;
        assert!(archive.exists());
        assert!(!dir.path().join("openblas-0.3.28.tar.gz.part").exists());

        let out = dir.path().join("restored");
        TarExtractor.extract(&RealRuntime, &archive, &out)?;
        assert_eq!(fs::read_to_string(out.join("interface/gemm.c"))?, "int x;");
        #[cfg(unix)]
        assert_eq!(fs::read_link(out.join("GNUmakefile"))?, Path::new("Makefile"));
        Ok(())
    }

    #[test]
    fn test_pack_missing_source_leaves_no_part_file() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("x-1.0.tar.gz");
        let result = pack_tar_gz(&RealRuntime, &dir.path().join("missing"), &archive, "x-1.0");
        assert!(result.is_err());
        assert!(!archive.exists());
        assert!(!dir.path().join("x-1.0.tar.gz.part").exists());
    }
}

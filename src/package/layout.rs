//! Deterministic on-disk layout of sources, builds and default links.
//!
//! ```text
//! <source-root>/<package>-<version>/            expanded source (transient)
//! <source-root>/<package>-<version>.tar.gz      cached source archive
//! <build-root>/<package>/<version>[-<variant>]  install prefix
//! <build-root>/<package>/<version>[-<variant>]/build   optional build tree
//! <build-root>/<package>/default -> <version>[-<variant>]
//! ```

use std::path::{Path, PathBuf};

use crate::error::InstallError;

/// Name of the nested build tree for packages that build out of source.
pub const BUILD_SUBDIR: &str = "build";

/// Default name of the version-switching symlink.
pub const DEFAULT_LINK_NAME: &str = "default";

/// Name of the per-package lock file under the package root.
pub const LOCK_FILE: &str = ".lock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    source_root: PathBuf,
    build_root: PathBuf,
}

/// All paths of one (package, version, variant) install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    /// `<source-root>/<package>-<version>`
    pub source_dir: PathBuf,
    /// `<build-root>/<package>/<version>[-<variant>]`, the install prefix
    pub build_dir: PathBuf,
    /// `<build_dir>/build` for packages with a separate build tree
    pub build_subdir: Option<PathBuf>,
    /// Final component of `build_dir`; also the default link's target
    pub dir_name: String,
    /// `<package>-<version>`, the cache archive name without extension
    pub archive_stem: String,
}

impl InstallLayout {
    pub fn new(source_root: impl Into<PathBuf>, build_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            build_root: build_root.into(),
        }
    }

    /// Where source archives are cached and sources are expanded.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    pub fn package_root(&self, package: &str) -> Result<PathBuf, InstallError> {
        check_component("package name", package)?;
        Ok(self.build_root.join(package))
    }

    /// Directory name for a version, with the variant appended after a single `-`.
    pub fn dir_name(version: &str, variant: Option<&str>) -> Result<String, InstallError> {
        check_component("version", version)?;
        match variant {
            Some(variant) => {
                check_component("variant", variant)?;
                Ok(format!("{}-{}", version, variant))
            }
            None => Ok(version.to_string()),
        }
    }

    /// Compute every path of an install. Pure: no filesystem access.
    pub fn paths(
        &self,
        package: &str,
        version: &str,
        variant: Option<&str>,
        with_build_subdir: bool,
    ) -> Result<InstallPaths, InstallError> {
        let package_root = self.package_root(package)?;
        let dir_name = Self::dir_name(version, variant)?;
        let build_dir = package_root.join(&dir_name);
        let archive_stem = format!("{}-{}", package, version);

        Ok(InstallPaths {
            source_dir: self.source_root.join(&archive_stem),
            build_subdir: with_build_subdir.then(|| build_dir.join(BUILD_SUBDIR)),
            build_dir,
            dir_name,
            archive_stem,
        })
    }

    /// `<build-root>/<package>/<link_name>`. Hidden names such as the lock
    /// file are reserved for bookkeeping.
    pub fn link_path(&self, package: &str, link_name: &str) -> Result<PathBuf, InstallError> {
        check_component("link name", link_name)?;
        if link_name.starts_with('.') {
            return Err(InstallError::validation(format!(
                "link name '{}' is reserved; names starting with '.' (like {}) are not links",
                link_name, LOCK_FILE
            )));
        }
        Ok(self.package_root(package)?.join(link_name))
    }

    pub fn lock_path(&self, package: &str) -> Result<PathBuf, InstallError> {
        Ok(self.package_root(package)?.join(LOCK_FILE))
    }
}

/// Reject anything that could escape its parent directory when joined.
fn check_component(kind: &str, value: &str) -> Result<(), InstallError> {
    if value.is_empty() {
        return Err(InstallError::validation(format!("{} must not be empty", kind)));
    }
    if value == "." || value == ".." {
        return Err(InstallError::validation(format!(
            "{} '{}' is not a valid path component",
            kind, value
        )));
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(InstallError::validation(format!(
            "{} '{}' must not contain path separators",
            kind, value
        )));
    }
    Ok(())
}

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::package::{InstallLayout, PackageTable};
use crate::runtime::Runtime;
use crate::runtime::path::normalize_path;

/// Directory under the home directory holding both default roots.
const HPC_DIR: &str = "hpc";
const SOURCES_DIR: &str = "sources";
const BUILDS_DIR: &str = "builds";

/// User descriptor file looked up under the platform config directory.
const PACKAGES_FILE: &[&str] = &["hpcbuild", "packages.json"];

/// Where things live and which packages are known.
#[derive(Debug, Clone)]
pub struct Config {
    pub layout: InstallLayout,
    pub packages: PackageTable,
}

impl Config {
    /// Resolve roots and descriptors. Explicit values (CLI or environment)
    /// win over defaults; an explicit descriptor file must exist.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(
        runtime: &R,
        source_root: Option<PathBuf>,
        build_root: Option<PathBuf>,
        packages_file: Option<PathBuf>,
    ) -> Result<Self> {
        let source_root = match source_root {
            Some(path) => absolute_root(runtime, &path)?,
            None => default_root(runtime, SOURCES_DIR)?,
        };
        let build_root = match build_root {
            Some(path) => absolute_root(runtime, &path)?,
            None => default_root(runtime, BUILDS_DIR)?,
        };
        info!(
            "Using source root {:?} and build root {:?}",
            source_root, build_root
        );

        let mut packages = PackageTable::builtin()?;
        match packages_file {
            Some(path) => packages.merge_file(runtime, &path)?,
            None => {
                if let Some(path) = user_packages_file(runtime) {
                    packages.merge_file(runtime, &path)?;
                }
            }
        }

        Ok(Self {
            layout: InstallLayout::new(source_root, build_root),
            packages,
        })
    }
}

/// `~/hpc/<leaf>`
#[tracing::instrument(skip(runtime))]
pub fn default_root<R: Runtime>(runtime: &R, leaf: &str) -> Result<PathBuf> {
    let home = runtime
        .home_dir()
        .context("Could not find home directory; pass --source-root and --build-root")?;
    Ok(home.join(HPC_DIR).join(leaf))
}

/// Steps run in their own working directories, so every root handed to
/// templates must be absolute.
fn absolute_root<R: Runtime>(runtime: &R, path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }
    let cwd = runtime
        .current_dir()
        .context("Cannot resolve a relative root without a current directory")?;
    Ok(normalize_path(&cwd.join(path)))
}

fn user_packages_file<R: Runtime>(runtime: &R) -> Option<PathBuf> {
    let path = PACKAGES_FILE
        .iter()
        .fold(runtime.config_dir()?, |dir, part| dir.join(part));
    if runtime.exists(&path) {
        debug!("Loading user descriptors from {:?}", path);
        Some(path)
    } else {
        None
    }
}

/// Default for `--jobs`: the number of CPUs available to this process.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

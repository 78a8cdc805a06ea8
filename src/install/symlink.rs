use anyhow::{Context, Result, bail};
use log::debug;
use std::ffi::OsStr;
use std::path::Path;

use crate::error::InstallError;
use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkChange {
    Created,
    Replaced,
    Unchanged,
}

/// Point `link_path` at the sibling directory `target` (a bare version
/// directory name, so the package root stays relocatable).
///
/// An existing link or file is removed first and a new link created. This
/// is a replace, not an atomic swap: readers may briefly see no link.
#[tracing::instrument(skip(runtime))]
pub fn point<R: Runtime>(runtime: &R, link_path: &Path, target: &str) -> Result<LinkChange> {
    let mut change = LinkChange::Created;

    if runtime.is_symlink(link_path) {
        match runtime.read_link(link_path) {
            Ok(existing) if existing.components().eq(Path::new(target).components()) => {
                debug!("{:?} already points to {}", link_path, target);
                return Ok(LinkChange::Unchanged);
            }
            Ok(existing) => debug!("{:?} points to {:?}, repointing", link_path, existing),
            Err(_) => debug!("{:?} is unreadable, recreating", link_path),
        }
        runtime.remove_symlink(link_path)?;
        change = LinkChange::Replaced;
    } else if runtime.exists(link_path) {
        if runtime.is_dir(link_path) {
            bail!("{:?} is a directory, not a symlink", link_path);
        }
        runtime.remove_file(link_path)?;
        change = LinkChange::Replaced;
    }

    runtime
        .symlink(Path::new(target), link_path)
        .with_context(|| format!("Failed to point {:?} at {}", link_path, target))?;
    Ok(change)
}

/// Reject a link slot that `point` could never fill: the target directory
/// itself, or any real directory.
pub fn check_slot<R: Runtime>(
    runtime: &R,
    link_path: &Path,
    target: &str,
) -> Result<(), InstallError> {
    if link_path.file_name() == Some(OsStr::new(target)) {
        return Err(InstallError::validation(format!(
            "link name '{}' is the install directory itself; choose another --link-name",
            target
        )));
    }
    if !runtime.is_symlink(link_path) && runtime.is_dir(link_path) {
        return Err(InstallError::validation(format!(
            "{} is a directory, not a link; choose another --link-name",
            link_path.display()
        )));
    }
    Ok(())
}

/// Version directory the link currently points at, if it is a symlink.
pub fn current<R: Runtime>(runtime: &R, link_path: &Path) -> Option<String> {
    if !runtime.is_symlink(link_path) {
        return None;
    }
    runtime
        .read_link(link_path)
        .ok()
        .map(|target| target.to_string_lossy().into_owned())
}

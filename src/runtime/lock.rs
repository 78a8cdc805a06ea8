//! Exclusive per-package lock files.

use anyhow::{Context, Result};
use log::debug;
use std::fs::OpenOptions;
use std::path::Path;

use super::RealRuntime;

/// Holds an exclusive lock for as long as it is alive.
///
/// Dropping the guard closes the file descriptor, which releases the lock.
pub struct PackageLock {
    #[cfg(unix)]
    _lock: Option<nix::fcntl::Flock<std::fs::File>>,
}

impl PackageLock {
    /// A guard that holds nothing, for runtimes that do not lock.
    pub fn unlocked() -> Self {
        Self {
            #[cfg(unix)]
            _lock: None,
        }
    }
}

impl std::fmt::Debug for PackageLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageLock").finish_non_exhaustive()
    }
}

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn lock_exclusive_impl(&self, path: &Path) -> Result<Option<PackageLock>> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file {:?}", path))?;

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::fcntl::{Flock, FlockArg};

            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(lock) => {
                    debug!("Acquired lock {:?}", path);
                    Ok(Some(PackageLock { _lock: Some(lock) }))
                }
                Err((_, Errno::EWOULDBLOCK)) => {
                    debug!("Lock {:?} is held by another process", path);
                    Ok(None)
                }
                Err((_, errno)) => {
                    Err(anyhow::anyhow!(errno)).with_context(|| format!("Failed to lock {:?}", path))
                }
            }
        }
        #[cfg(not(unix))]
        {
            drop(file);
            debug!("File locking unsupported here, proceeding without {:?}", path);
            Ok(Some(PackageLock::unlocked()))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use tempfile::tempdir;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lock");

        let first = runtime.lock_exclusive(&path).unwrap();
        assert!(first.is_some());
        assert!(path.exists());

        // flock locks belong to the open file description, so a second open conflicts
        let second = runtime.lock_exclusive(&path).unwrap();
        assert!(second.is_none());

        drop(first);
        let third = runtime.lock_exclusive(&path).unwrap();
        assert!(third.is_some());
    }
}

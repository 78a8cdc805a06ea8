use anyhow::Result;

use crate::config::Config;
use crate::error::InstallError;
use crate::install::{
    LinkChange, SYMLINK_STEP, check_link_slot, lock_package, locate, point_link,
};
use crate::package::InstallLayout;
use crate::runtime::Runtime;

/// Point a package's link at an already installed version.
#[tracing::instrument(skip(runtime, config))]
pub fn switch<R: Runtime>(
    runtime: &R,
    config: &Config,
    package: &str,
    version: &str,
    variant: Option<&str>,
    link_name: &str,
) -> Result<()> {
    let descriptor = config.packages.get(package)?;
    let variant = descriptor.select_variant(variant)?;
    let link_path = config.layout.link_path(package, link_name)?;

    locate(runtime, &config.layout, package, Some(version), variant.as_deref())?;
    let dir_name = InstallLayout::dir_name(version, variant.as_deref())?;
    check_link_slot(runtime, &link_path, &dir_name)?;

    let _lock = lock_package(runtime, &config.layout, package)?;
    let change = point_link(runtime, &link_path, &dir_name)
        .map_err(|e| InstallError::build(SYMLINK_STEP, format!("{:#}", e)))?;

    if change == LinkChange::Unchanged {
        println!("   {} already points to {}", link_path.display(), dir_name);
    } else {
        println!("   {} -> {}", link_path.display(), dir_name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::exit_code;
    use crate::package::PackageTable;
    use crate::runtime::RealRuntime;
    use std::fs;
    use std::path::PathBuf;

    fn config(root: &std::path::Path) -> Config {
        Config {
            layout: InstallLayout::new(root.join("sources"), root.join("builds")),
            packages: PackageTable::builtin().unwrap(),
        }
    }

    #[test]
    fn test_switch_to_installed_version() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let builds = dir.path().join("builds/openmpi");
        fs::create_dir_all(builds.join("4.1.6")).unwrap();
        fs::create_dir_all(builds.join("5.0.8-lp64")).unwrap();
        std::os::unix::fs::symlink("4.1.6", builds.join("default")).unwrap();

        switch(&RealRuntime, &config, "openmpi", "5.0.8", Some("lp64"), "default").unwrap();

        assert_eq!(
            fs::read_link(builds.join("default")).unwrap(),
            PathBuf::from("5.0.8-lp64")
        );
    }

    #[test]
    fn test_switch_applies_default_variant() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let builds = dir.path().join("builds/openblas");
        fs::create_dir_all(builds.join("0.3.28-lp64")).unwrap();

        switch(&RealRuntime, &config, "openblas", "0.3.28", None, "stable").unwrap();

        assert_eq!(
            fs::read_link(builds.join("stable")).unwrap(),
            PathBuf::from("0.3.28-lp64")
        );
    }

    #[test]
    fn test_switch_rejects_lock_file_and_install_dir_as_link() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let builds = dir.path().join("builds/cmake");
        fs::create_dir_all(builds.join("3.30.5")).unwrap();

        for link_name in [".lock", "3.30.5"] {
            let err =
                switch(&RealRuntime, &config, "cmake", "3.30.5", None, link_name).unwrap_err();
            assert_eq!(exit_code(&err), 2, "link name {}", link_name);
        }
        assert!(!builds.join(".lock").is_symlink());
        assert!(builds.join("3.30.5").is_dir());

        switch(&RealRuntime, &config, "cmake", "3.30.5", None, "default").unwrap();
        assert_eq!(
            fs::read_link(builds.join("default")).unwrap(),
            PathBuf::from("3.30.5")
        );
    }

    #[test]
    fn test_switch_to_missing_version_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let err =
            switch(&RealRuntime, &config, "cmake", "3.30.5", None, "default").unwrap_err();
        assert_eq!(exit_code(&err), 3);
        assert!(!dir.path().join("builds/cmake/default").exists());
    }
}

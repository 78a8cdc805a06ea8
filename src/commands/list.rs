use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::config::Config;
use crate::install::current_link;
use crate::package::{DEFAULT_LINK_NAME, InstallLayout};
use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub versions: Vec<String>,
    /// Target of the `default` link, if there is one
    pub default: Option<String>,
}

/// Installed version directories per package, sorted by name.
#[tracing::instrument(skip(runtime, layout))]
pub fn installed<R: Runtime>(
    runtime: &R,
    layout: &InstallLayout,
    package: Option<&str>,
) -> Result<Vec<InstalledPackage>> {
    let roots = match package {
        Some(name) => vec![layout.package_root(name)?],
        None if runtime.is_dir(layout.build_root()) => runtime
            .read_dir(layout.build_root())?
            .into_iter()
            .filter(|p| is_plain_dir(runtime, p))
            .collect(),
        None => vec![],
    };

    let mut found = Vec::new();
    for root in roots {
        let Some(name) = file_name(&root) else {
            continue;
        };
        if !runtime.is_dir(&root) {
            debug!("{:?} is not installed", root);
            continue;
        }
        let versions: Vec<String> = runtime
            .read_dir(&root)?
            .iter()
            .filter(|p| is_plain_dir(runtime, p))
            .filter_map(|p| file_name(p))
            .collect();
        let default = current_link(runtime, &root.join(DEFAULT_LINK_NAME));
        found.push(InstalledPackage {
            name,
            versions,
            default,
        });
    }
    Ok(found)
}

/// Print installed versions, marking the default.
#[tracing::instrument(skip(runtime, config))]
pub fn list<R: Runtime>(runtime: &R, config: &Config, package: Option<&str>) -> Result<()> {
    let packages = installed(runtime, &config.layout, package)?;
    if packages.iter().all(|p| p.versions.is_empty()) {
        println!("No packages installed.");
        return Ok(());
    }

    for package in packages.iter().filter(|p| !p.versions.is_empty()) {
        println!("{}", package.name);
        for version in &package.versions {
            if package.default.as_deref() == Some(version.as_str()) {
                println!("  {} ({})", version, DEFAULT_LINK_NAME);
            } else {
                println!("  {}", version);
            }
        }
    }
    Ok(())
}

fn is_plain_dir<R: Runtime>(runtime: &R, path: &Path) -> bool {
    runtime.is_dir(path)
        && !runtime.is_symlink(path)
        && file_name(path).is_some_and(|n| !n.starts_with('.'))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

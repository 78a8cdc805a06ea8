//! Locating required tools and previously installed packages.
//!
//! All probing happens before anything is fetched, so a missing
//! prerequisite never costs a download.

use log::debug;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::InstallError;
use crate::package::{BuildMode, DEFAULT_LINK_NAME, InstallLayout, PackageDescriptor};
use crate::runtime::Runtime;

/// `--dep NAME=VERSION[:VARIANT]`: build against a specific installed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepOverride {
    pub package: String,
    pub version: String,
    pub variant: Option<String>,
}

impl FromStr for DepOverride {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            InstallError::validation(format!(
                "invalid dependency '{}'; expected NAME=VERSION[:VARIANT]",
                s
            ))
        };
        let (package, rest) = s.split_once('=').ok_or_else(invalid)?;
        let (version, variant) = match rest.split_once(':') {
            Some((version, variant)) => (version, Some(variant)),
            None => (rest, None),
        };
        if package.is_empty() || version.is_empty() || variant.is_some_and(str::is_empty) {
            return Err(invalid());
        }
        Ok(Self {
            package: package.to_string(),
            version: version.to_string(),
            variant: variant.map(str::to_string),
        })
    }
}

/// Every required tool must be on `PATH`.
pub fn check_tools<R: Runtime>(
    runtime: &R,
    package: &str,
    tools: &[String],
) -> Result<(), InstallError> {
    for tool in tools {
        match runtime.which(tool) {
            Some(path) => debug!("Found {} at {:?}", tool, path),
            None => {
                return Err(InstallError::MissingTool {
                    tool: tool.clone(),
                    package: package.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Path of an installed package: its default link, or an explicit
/// `<version>[-<variant>]` directory.
pub fn locate<R: Runtime>(
    runtime: &R,
    layout: &InstallLayout,
    package: &str,
    version: Option<&str>,
    variant: Option<&str>,
) -> Result<PathBuf, InstallError> {
    let (expected, install_hint) = match version {
        Some(version) => {
            let dir_name = InstallLayout::dir_name(version, variant)?;
            let hint = match variant {
                Some(variant) => format!("hpcbuild install {} {} {}", package, version, variant),
                None => format!("hpcbuild install {} {}", package, version),
            };
            (layout.package_root(package)?.join(dir_name), hint)
        }
        None => (
            layout.link_path(package, DEFAULT_LINK_NAME)?,
            format!("hpcbuild install {} <VERSION>", package),
        ),
    };

    // `is_dir` follows the link, so a dangling default counts as missing
    if runtime.is_dir(&expected) {
        debug!("Located {} at {:?}", package, expected);
        Ok(expected)
    } else {
        Err(InstallError::MissingPackage {
            package: package.to_string(),
            expected,
            install_hint,
        })
    }
}

/// Locate every dependency of `descriptor` that applies in `mode`.
///
/// Returns the install path per dependency name, for `{dep.<name>}`.
pub fn resolve_dependencies<R: Runtime>(
    runtime: &R,
    layout: &InstallLayout,
    descriptor: &PackageDescriptor,
    mode: BuildMode,
    variant: Option<&str>,
    overrides: &[DepOverride],
) -> Result<BTreeMap<String, PathBuf>, InstallError> {
    for dep in overrides {
        if !descriptor.dependencies.iter().any(|d| d.package == dep.package) {
            return Err(InstallError::validation(format!(
                "{} is not a dependency of {}",
                dep.package, descriptor.name
            )));
        }
    }

    let mut located = BTreeMap::new();
    for dep in &descriptor.dependencies {
        if !dep.applies_to(mode) {
            debug!("Skipping {} for a {} build", dep.package, mode);
            continue;
        }
        let path = match overrides.iter().find(|o| o.package == dep.package) {
            Some(o) => {
                let dep_variant = o
                    .variant
                    .as_deref()
                    .or(if dep.match_variant { variant } else { None });
                locate(runtime, layout, &dep.package, Some(&o.version), dep_variant)?
            }
            None => locate(runtime, layout, &dep.package, None, None)?,
        };
        located.insert(dep.package.clone(), path);
    }
    Ok(located)
}

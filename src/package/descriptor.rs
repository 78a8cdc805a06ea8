//! Per-package build descriptors.
//!
//! A descriptor is everything that differs between two packages: where the
//! source comes from, which variants exist, what must already be installed,
//! and the ordered shell steps that configure, compile and install it.
//! Built-in descriptors ship in `builtin.json`; users can add or override
//! them with a JSON file of the same shape.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use crate::error::InstallError;
use crate::package::template::placeholders;
use crate::runtime::Runtime;

const BUILTIN_DESCRIPTORS: &str = include_str!("builtin.json");

/// Placeholders every step may use.
pub const STANDARD_PLACEHOLDERS: &[&str] = &[
    "prefix",
    "source_dir",
    "version",
    "major_minor",
    "variant",
    "variant_args",
    "mode_args",
    "jobs",
];

/// Placeholder only available to packages with a nested build tree.
pub const BUILD_SUBDIR_PLACEHOLDER: &str = "build_subdir";

/// Prefix of dependency placeholders, e.g. `{dep.openmpi}`.
pub const DEP_PLACEHOLDER_PREFIX: &str = "dep.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Serial,
    #[default]
    Parallel,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Serial => write!(f, "serial"),
            BuildMode::Parallel => write!(f, "parallel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Configure,
    Build,
    Install,
}

/// Working directory of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepDir {
    #[default]
    Source,
    /// The nested build tree; requires `build_subdir`
    Build,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildStep {
    pub name: String,
    pub phase: Phase,
    /// Shell command line, run with `sh -c` after placeholder expansion
    pub run: String,
    #[serde(default)]
    pub dir: StepDir,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub only: Option<BuildMode>,
}

impl BuildStep {
    pub fn applies_to(&self, mode: BuildMode) -> bool {
        self.only.is_none_or(|only| only == mode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencySpec {
    pub package: String,
    #[serde(default)]
    pub only: Option<BuildMode>,
    /// Append the dependent's own variant to an explicitly requested version
    #[serde(default)]
    pub match_variant: bool,
}

impl DependencySpec {
    pub fn applies_to(&self, mode: BuildMode) -> bool {
        self.only.is_none_or(|only| only == mode)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyKind {
    #[default]
    File,
    Dir,
    Executable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyCheck {
    /// Path relative to the install prefix
    pub path: String,
    #[serde(default)]
    pub kind: VerifyKind,
}

fn default_ref() -> String {
    "master".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Release tarball URL template (`{version}`, `{major_minor}`)
    #[serde(default)]
    pub release_url: Option<String>,
    /// Repository cloned for development refs
    #[serde(default)]
    pub git_url: Option<String>,
    #[serde(default = "default_ref")]
    pub default_ref: String,
    /// Allowed variant qualifiers; empty means the package has none
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default)]
    pub default_variant: Option<String>,
    #[serde(default)]
    pub variant_args: BTreeMap<String, String>,
    #[serde(default)]
    pub mode_args: BTreeMap<BuildMode, String>,
    #[serde(default)]
    pub build_subdir: bool,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub steps: Vec<BuildStep>,
    #[serde(default)]
    pub verify: Vec<VerifyCheck>,
}

impl PackageDescriptor {
    /// Check the variant against the allow-set, applying the default variant.
    pub fn select_variant(&self, requested: Option<&str>) -> Result<Option<String>, InstallError> {
        match requested {
            Some(variant) if self.variants.iter().any(|v| v == variant) => {
                Ok(Some(variant.to_string()))
            }
            Some(variant) if self.variants.is_empty() => Err(InstallError::validation(format!(
                "{} does not support variants (got '{}')",
                self.name, variant
            ))),
            Some(variant) => Err(InstallError::validation(format!(
                "invalid variant '{}' for {}; expected one of: {}",
                variant,
                self.name,
                self.variants.join(", ")
            ))),
            None => Ok(self.default_variant.clone()),
        }
    }

    /// Release download URL for a version.
    pub fn release_url_for(&self, version: &str) -> Option<String> {
        self.release_url.as_ref().map(|url| {
            url.replace("{version}", version)
                .replace("{major_minor}", &major_minor(version))
        })
    }

    /// Structural checks run when descriptors are loaded.
    pub fn validate(&self) -> Result<(), InstallError> {
        let invalid = |reason: String| {
            Err(InstallError::validation(format!(
                "invalid descriptor '{}': {}",
                self.name, reason
            )))
        };

        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return invalid("name must be a single path component".into());
        }
        if self.release_url.is_none() && self.git_url.is_none() {
            return invalid("needs a release_url or a git_url".into());
        }
        if self.steps.is_empty() {
            return invalid("has no build steps".into());
        }

        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return invalid(format!("duplicate step name '{}'", step.name));
            }
            if step.dir == StepDir::Build && !self.build_subdir {
                return invalid(format!(
                    "step '{}' runs in the build tree but build_subdir is false",
                    step.name
                ));
            }
        }

        for variant in self.variant_args.keys() {
            if !self.variants.contains(variant) {
                return invalid(format!("variant_args names unknown variant '{}'", variant));
            }
        }
        if let Some(default) = &self.default_variant {
            if !self.variants.contains(default) {
                return invalid(format!("default_variant '{}' is not a variant", default));
            }
        }

        let templates = self
            .steps
            .iter()
            .flat_map(|s| std::iter::once(&s.run).chain(s.env.values()))
            .chain(self.env.values());
        for template in templates {
            for name in placeholders(template) {
                if !self.knows_placeholder(&name) {
                    return invalid(format!("unknown placeholder {{{}}}", name));
                }
            }
        }
        Ok(())
    }

    fn knows_placeholder(&self, name: &str) -> bool {
        if STANDARD_PLACEHOLDERS.contains(&name) {
            return true;
        }
        if name == BUILD_SUBDIR_PLACEHOLDER {
            return self.build_subdir;
        }
        match name.strip_prefix(DEP_PLACEHOLDER_PREFIX) {
            Some(dep) => self.dependencies.iter().any(|d| d.package == dep),
            None => false,
        }
    }
}

/// `5.0.8` -> `5.0`; versions without a dot are returned unchanged.
pub fn major_minor(version: &str) -> String {
    let mut parts = version.splitn(3, '.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("{}.{}", major, minor),
        _ => version.to_string(),
    }
}

/// Every known package, keyed by name.
#[derive(Debug, Clone)]
pub struct PackageTable {
    descriptors: BTreeMap<String, PackageDescriptor>,
}

impl PackageTable {
    pub fn builtin() -> Result<Self> {
        let mut table = Self {
            descriptors: BTreeMap::new(),
        };
        table
            .merge_json(BUILTIN_DESCRIPTORS)
            .context("Built-in package descriptors are invalid")?;
        Ok(table)
    }

    /// Add descriptors from a JSON array, replacing built-ins of the same name.
    pub fn merge_json(&mut self, json: &str) -> Result<()> {
        let descriptors: Vec<PackageDescriptor> =
            serde_json::from_str(json).context("Failed to parse package descriptors")?;
        for descriptor in descriptors {
            descriptor.validate()?;
            if self.descriptors.contains_key(&descriptor.name) {
                debug!("Overriding descriptor for {}", descriptor.name);
            }
            self.descriptors.insert(descriptor.name.clone(), descriptor);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn merge_file<R: Runtime>(&mut self, runtime: &R, path: &Path) -> Result<()> {
        let json = runtime.read_to_string(path)?;
        self.merge_json(&json)
            .with_context(|| format!("Invalid package descriptor file {:?}", path))
    }

    pub fn get(&self, name: &str) -> Result<&PackageDescriptor, InstallError> {
        self.descriptors.get(name).ok_or_else(|| {
            InstallError::validation(format!(
                "unknown package '{}'; known packages: {}",
                name,
                self.descriptors.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageDescriptor> {
        self.descriptors.values()
    }
}

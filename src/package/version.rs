//! Version resolution for packages.
//!
//! A user-supplied token is classified once into a [`VersionSpec`]. Release
//! tags are used verbatim; development refs are resolved against the fetched
//! source tree by probing well-known metadata files, falling back to a
//! `YYYY.MM-dev` stamp when the tree declares nothing.

use log::debug;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use crate::error::InstallError;
use crate::runtime::Runtime;

/// Suffix appended to every version derived from a development checkout.
pub const DEV_SUFFIX: &str = "-dev";

/// A version request, decided once at argument parsing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// Immutable tagged release (token starts with a digit)
    Release(String),
    /// Moving development reference such as a branch name
    Development(String),
}

impl VersionSpec {
    /// Classify a token. Digit-leading tokens are releases unless `force_dev` is set.
    pub fn parse(token: &str, force_dev: bool) -> Result<Self, InstallError> {
        if token.trim().is_empty() {
            return Err(InstallError::validation("version must not be empty"));
        }
        if token.trim() != token {
            return Err(InstallError::validation(format!(
                "version '{}' must not have surrounding whitespace",
                token
            )));
        }
        let starts_with_digit = token.chars().next().is_some_and(|c| c.is_ascii_digit());
        if starts_with_digit && !force_dev {
            Ok(VersionSpec::Release(token.to_string()))
        } else {
            Ok(VersionSpec::Development(token.to_string()))
        }
    }

    /// The raw token: the release tag or the development ref.
    pub fn token(&self) -> &str {
        match self {
            VersionSpec::Release(tag) => tag,
            VersionSpec::Development(reference) => reference,
        }
    }

    pub fn is_release(&self) -> bool {
        matches!(self, VersionSpec::Release(_))
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Release(tag) => write!(f, "{}", tag),
            VersionSpec::Development(reference) => write!(f, "{} (development)", reference),
        }
    }
}

type VersionReader = fn(&str) -> Option<String>;

/// Metadata files consulted for development checkouts, highest priority first:
/// plain version files, then build-system declarations, then packaging metadata.
const VERSION_READERS: &[(&str, VersionReader)] = &[
    ("VERSION", parse_version_file),
    ("version.txt", parse_version_file),
    ("CMakeLists.txt", parse_cmake_project),
    ("configure.ac", parse_ac_init),
    ("pyproject.toml", parse_pyproject),
    ("setup.cfg", parse_setup_cfg),
];

/// Turns a [`VersionSpec`] into the canonical on-disk version string.
pub struct VersionResolver<'a, R: Runtime> {
    runtime: &'a R,
}

impl<'a, R: Runtime> VersionResolver<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// Resolve a version. Never fails: development refs without declared
    /// metadata (or without a source tree) fall back to a date stamp.
    #[tracing::instrument(skip(self))]
    pub fn resolve(&self, spec: &VersionSpec, source_tree: Option<&Path>) -> String {
        match spec {
            VersionSpec::Release(tag) => tag.clone(),
            VersionSpec::Development(reference) => {
                let declared = source_tree.and_then(|tree| self.declared_version(tree));
                match declared {
                    Some(version) => format!("{}{}", version, DEV_SUFFIX),
                    None => {
                        let fallback = self.date_version();
                        debug!(
                            "No declared version for development ref {}, using {}",
                            reference, fallback
                        );
                        fallback
                    }
                }
            }
        }
    }

    /// First non-empty version declared in the tree, trimmed.
    pub fn declared_version(&self, source_tree: &Path) -> Option<String> {
        for (file, read_version) in VERSION_READERS {
            let path = source_tree.join(file);
            if !self.runtime.exists(&path) {
                continue;
            }
            let contents = match self.runtime.read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    debug!("Skipping unreadable {:?}: {}", path, e);
                    continue;
                }
            };
            if let Some(version) = read_version(&contents)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
            {
                debug!("Found declared version {} in {:?}", version, path);
                return Some(version);
            }
        }
        None
    }

    fn date_version(&self) -> String {
        format!("{}{}", self.runtime.now().format("%Y.%m"), DEV_SUFFIX)
    }
}

/// A bare version on the first non-empty line, or Open MPI style
/// `major=`/`minor=`/`release=` assignments.
fn parse_version_file(contents: &str) -> Option<String> {
    let mut major = None;
    let mut minor = None;
    let mut release = None;
    for line in contents.lines().map(str::trim) {
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "major" => major = Some(value),
                "minor" => minor = Some(value),
                "release" => release = Some(value),
                _ => {}
            }
        }
    }
    if let Some(major) = major.filter(|v| !v.is_empty()) {
        let mut version = major;
        for part in [minor, release].into_iter().flatten() {
            if !part.is_empty() {
                version.push('.');
                version.push_str(&part);
            }
        }
        return Some(version);
    }

    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#') && !line.contains('='))
        .map(str::to_string)
}

static CMAKE_PROJECT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bproject\s*\([^)]*?\bVERSION\s+"?([0-9][0-9A-Za-z.+\-]*)"?"#)
        .expect("valid regex")
});

fn parse_cmake_project(contents: &str) -> Option<String> {
    CMAKE_PROJECT_VERSION
        .captures(contents)
        .map(|caps| caps[1].to_string())
}

static AC_INIT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"AC_INIT\(\s*\[?[^,\]]*\]?\s*,\s*\[?\s*([0-9A-Za-z][0-9A-Za-z_.+\-]*)\s*\]?")
        .expect("valid regex")
});

fn parse_ac_init(contents: &str) -> Option<String> {
    AC_INIT_VERSION
        .captures(contents)
        .map(|caps| caps[1].to_string())
        .filter(|version| !version.starts_with("m4_"))
}

fn parse_pyproject(contents: &str) -> Option<String> {
    let table: toml::Table = toml::from_str(contents).ok()?;
    let from_project = table
        .get("project")
        .and_then(|project| project.get("version"))
        .and_then(|version| version.as_str());
    let from_poetry = || {
        table
            .get("tool")
            .and_then(|tool| tool.get("poetry"))
            .and_then(|poetry| poetry.get("version"))
            .and_then(|version| version.as_str())
    };
    from_project.or_else(from_poetry).map(str::to_string)
}

fn parse_setup_cfg(contents: &str) -> Option<String> {
    let mut in_metadata = false;
    for line in contents.lines().map(str::trim) {
        if line.starts_with('[') {
            in_metadata = line == "[metadata]";
            continue;
        }
        if !in_metadata {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            // attr: and file: indirections need code execution to resolve
            if key.trim() == "version" && !value.starts_with("attr:") && !value.starts_with("file:")
            {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use chrono::{Local, TimeZone};
    use mockall::predicate::eq;
    use regex::Regex;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_parse_classifies_by_leading_digit() {
        assert_eq!(
            VersionSpec::parse("5.0.8", false).unwrap(),
            VersionSpec::Release("5.0.8".into())
        );
        assert_eq!(
            VersionSpec::parse("main", false).unwrap(),
            VersionSpec::Development("main".into())
        );
        assert_eq!(
            VersionSpec::parse("v2.1", false).unwrap(),
            VersionSpec::Development("v2.1".into())
        );
    }

    #[test]
    fn test_parse_force_dev_overrides_digit() {
        assert_eq!(
            VersionSpec::parse("25.0", true).unwrap(),
            VersionSpec::Development("25.0".into())
        );
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            VersionSpec::parse("", false),
            Err(InstallError::Validation(_))
        ));
        assert!(VersionSpec::parse("   ", true).is_err());
    }

    #[test]
    fn test_parse_rejects_surrounding_whitespace() {
        for token in [" 5.0.8", "5.0.8 ", "\tmain", "main\n"] {
            assert!(
                matches!(
                    VersionSpec::parse(token, false),
                    Err(InstallError::Validation(_))
                ),
                "expected rejection of {:?}",
                token
            );
        }
    }

    #[test]
    fn test_release_resolves_verbatim_without_fs() {
        // No expectations: any filesystem access would panic
        let runtime = MockRuntime::new();
        let resolver = VersionResolver::new(&runtime);
        for tag in ["5.0.8", "0.3.28", "2024.1", "1"] {
            let spec = VersionSpec::parse(tag, false).unwrap();
            assert_eq!(resolver.resolve(&spec, Some(Path::new("/src/x"))), tag);
        }
    }

    #[test]
    fn test_dev_uses_declared_version_with_suffix() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("VERSION"), "  2.1.3 \n").unwrap();

        let runtime = RealRuntime;
        let resolver = VersionResolver::new(&runtime);
        let spec = VersionSpec::Development("main".into());
        assert_eq!(resolver.resolve(&spec, Some(dir.path())), "2.1.3-dev");
    }

    #[test]
    fn test_dev_version_prefers_version_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("VERSION"), "3.0\n").unwrap();
        std::fs::write(
            dir.path().join("CMakeLists.txt"),
            "project(x VERSION 9.9.9 LANGUAGES C)\n",
        )
        .unwrap();

        let runtime = RealRuntime;
        let resolver = VersionResolver::new(&runtime);
        assert_eq!(resolver.declared_version(dir.path()).as_deref(), Some("3.0"));
    }

    #[test]
    fn test_dev_skips_empty_version_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("VERSION"), "\n\n").unwrap();
        std::fs::write(
            dir.path().join("pyproject.toml"),
            "[project]\nname = \"x\"\nversion = \"1.4.0\"\n",
        )
        .unwrap();

        let runtime = RealRuntime;
        let resolver = VersionResolver::new(&runtime);
        assert_eq!(resolver.declared_version(dir.path()).as_deref(), Some("1.4.0"));
    }

    #[test]
    fn test_dev_fallback_uses_year_month() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);
        runtime
            .expect_now()
            .returning(|| Local.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap());

        let resolver = VersionResolver::new(&runtime);
        let spec = VersionSpec::Development("master".into());
        assert_eq!(
            resolver.resolve(&spec, Some(Path::new("/src/pkg"))),
            "2025.03-dev"
        );
    }

    #[test]
    fn test_dev_fallback_matches_pattern_with_real_clock() {
        let dir = tempdir().unwrap();
        let runtime = RealRuntime;
        let resolver = VersionResolver::new(&runtime);
        let resolved = resolver.resolve(&VersionSpec::Development("dev".into()), Some(dir.path()));
        assert!(Regex::new(r"^\d{4}\.\d{2}-dev$").unwrap().is_match(&resolved));
    }

    #[test]
    fn test_unreadable_version_file_is_skipped() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/src/pkg/VERSION")))
            .returning(|_| true);
        runtime.expect_exists().returning(|_| false);
        runtime
            .expect_read_to_string()
            .returning(|_| Err(anyhow::anyhow!("permission denied")));

        let resolver = VersionResolver::new(&runtime);
        assert_eq!(resolver.declared_version(Path::new("/src/pkg")), None);
    }

    #[test]
    fn test_parse_version_file_openmpi_style() {
        let contents = "# comment\nmajor=5\nminor=1\nrelease=0\ngreek=a1\nrepo_rev=abc\n";
        assert_eq!(parse_version_file(contents).as_deref(), Some("5.1.0"));
    }

    #[test]
    fn test_parse_cmake_project_multiline() {
        let contents = "cmake_minimum_required(VERSION 3.20)\nproject(DIRAC\n  VERSION \"25.0\"\n  LANGUAGES Fortran C CXX)\n";
        assert_eq!(parse_cmake_project(contents).as_deref(), Some("25.0"));
        assert_eq!(parse_cmake_project("project(foo C)"), None);
    }

    #[test]
    fn test_parse_ac_init() {
        assert_eq!(
            parse_ac_init("AC_INIT([hdf5], [1.14.4], [help@hdfgroup.org])").as_deref(),
            Some("1.14.4")
        );
        assert_eq!(parse_ac_init("AC_INIT([x], m4_esyscmd([./version]))"), None);
    }

    #[test]
    fn test_parse_pyproject_poetry() {
        let contents = "[tool.poetry]\nname = \"x\"\nversion = \"0.9.1\"\n";
        assert_eq!(parse_pyproject(contents).as_deref(), Some("0.9.1"));
        assert_eq!(parse_pyproject("not = [valid"), None);
    }

    #[test]
    fn test_parse_setup_cfg_ignores_indirection() {
        assert_eq!(
            parse_setup_cfg("[metadata]\nname = x\nversion = 1.2\n").as_deref(),
            Some("1.2")
        );
        assert_eq!(
            parse_setup_cfg("[metadata]\nversion = attr: x.__version__\n"),
            None
        );
        assert_eq!(parse_setup_cfg("[options]\nversion = 3\n"), None);
    }
}

//! Lexical path helpers used when resolving links and unpacking archives.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Check whether `path` lies under `dir`, comparing normalized components.
///
/// `/builds/openmpi/../../etc/passwd` is NOT under `/builds/openmpi`.
pub fn is_path_under(path: &Path, dir: &Path) -> bool {
    normalize_path(path).starts_with(normalize_path(dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_collapses_dots() {
        assert_eq!(
            normalize_path(Path::new("/builds/./openmpi/../dirac/default")),
            PathBuf::from("/builds/dirac/default")
        );
    }

    #[test]
    fn test_normalize_path_keeps_leading_parent_of_relative_path() {
        assert_eq!(
            normalize_path(Path::new("../src/./a")),
            PathBuf::from("../src/a")
        );
    }

    #[test]
    fn test_normalize_path_only_dots() {
        assert_eq!(normalize_path(Path::new("./././.")), PathBuf::from(""));
    }

    #[test]
    fn test_is_path_under_simple() {
        assert!(is_path_under(
            Path::new("/src/openmpi-5.0.8/configure"),
            Path::new("/src/openmpi-5.0.8")
        ));
        assert!(is_path_under(Path::new("/src/a"), Path::new("/src/a")));
    }

    #[test]
    fn test_is_path_under_partial_component_match() {
        assert!(!is_path_under(
            Path::new("/builds/openmpi-extra/bin"),
            Path::new("/builds/openmpi")
        ));
    }

    #[test]
    fn test_is_path_under_directory_traversal() {
        assert!(!is_path_under(
            Path::new("/src/pkg/../../etc/passwd"),
            Path::new("/src/pkg")
        ));
        assert!(is_path_under(
            Path::new("/src/pkg/sub/../file"),
            Path::new("/src/pkg")
        ));
    }
}

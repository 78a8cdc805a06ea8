use anyhow::Result;

use crate::config::Config;
use crate::install;
use crate::runtime::Runtime;

/// Print the install path of a package, as a dependent build would see it.
#[tracing::instrument(skip(runtime, config))]
pub fn locate<R: Runtime>(
    runtime: &R,
    config: &Config,
    package: &str,
    version: Option<&str>,
    variant: Option<&str>,
) -> Result<()> {
    // Known packages get their default variant; others are taken literally
    let variant = match (version, config.packages.get(package)) {
        (Some(_), Ok(descriptor)) => descriptor.select_variant(variant)?,
        _ => variant.map(str::to_string),
    };
    let path = install::locate(runtime, &config.layout, package, version, variant.as_deref())?;
    println!("{}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::exit_code;
    use crate::package::{InstallLayout, PackageTable};
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    fn config() -> Config {
        Config {
            layout: InstallLayout::new("/home/user/hpc/sources", "/home/user/hpc/builds"),
            packages: PackageTable::builtin().unwrap(),
        }
    }

    #[test]
    fn test_locate_default_variant_of_known_package() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_is_dir()
            .with(eq(PathBuf::from("/home/user/hpc/builds/dirac/25.0-lp64")))
            .returning(|_| true);

        locate(&runtime, &config(), "dirac", Some("25.0"), None).unwrap();
    }

    #[test]
    fn test_locate_unknown_package_literal_path() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_is_dir()
            .with(eq(PathBuf::from("/home/user/hpc/builds/hdf5/default")))
            .returning(|_| false);

        let err = locate(&runtime, &config(), "hdf5", None, None).unwrap_err();
        assert_eq!(exit_code(&err), 3);
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::InstallError;
use crate::package::template::{TemplateVars, expand};
use crate::package::{
    BUILD_SUBDIR_PLACEHOLDER, BuildMode, DEP_PLACEHOLDER_PREFIX, InstallPaths, PackageDescriptor,
    Phase, StepDir, VersionSpec, major_minor,
};
use crate::runner::PreparedStep;

/// Everything one install run needs, fixed once the version is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallContext {
    pub package: String,
    pub spec: VersionSpec,
    /// Resolved on-disk version
    pub version: String,
    pub variant: Option<String>,
    pub mode: BuildMode,
    pub jobs: usize,
    pub paths: InstallPaths,
    pub link_path: PathBuf,
    /// Install path of each dependency, by package name
    pub deps: BTreeMap<String, PathBuf>,
}

impl InstallContext {
    pub fn template_vars(&self, descriptor: &PackageDescriptor) -> TemplateVars {
        let variant = self.variant.as_deref().unwrap_or_default();
        let mut vars = TemplateVars::from([
            ("prefix".into(), self.paths.build_dir.display().to_string()),
            ("source_dir".into(), self.paths.source_dir.display().to_string()),
            ("version".into(), self.version.clone()),
            ("major_minor".into(), major_minor(&self.version)),
            ("variant".into(), variant.to_string()),
            (
                "variant_args".into(),
                descriptor.variant_args.get(variant).cloned().unwrap_or_default(),
            ),
            (
                "mode_args".into(),
                descriptor.mode_args.get(&self.mode).cloned().unwrap_or_default(),
            ),
            ("jobs".into(), self.jobs.to_string()),
        ]);
        if let Some(build_subdir) = &self.paths.build_subdir {
            vars.insert(
                BUILD_SUBDIR_PLACEHOLDER.into(),
                build_subdir.display().to_string(),
            );
        }
        for (name, path) in &self.deps {
            vars.insert(
                format!("{}{}", DEP_PLACEHOLDER_PREFIX, name),
                path.display().to_string(),
            );
        }
        vars
    }

    /// Expand every step of `descriptor` that applies to this build, in
    /// phase order. Fails before anything runs if a template is invalid.
    pub fn prepare_steps(
        &self,
        descriptor: &PackageDescriptor,
    ) -> Result<Vec<(Phase, PreparedStep)>, InstallError> {
        let vars = self.template_vars(descriptor);

        let mut common_env = BTreeMap::new();
        for (key, value) in &descriptor.env {
            common_env.insert(key.clone(), expand(value, &vars)?);
        }

        let mut prepared = Vec::new();
        for phase in [Phase::Configure, Phase::Build, Phase::Install] {
            for step in descriptor
                .steps
                .iter()
                .filter(|s| s.phase == phase && s.applies_to(self.mode))
            {
                let cwd = match step.dir {
                    StepDir::Source => self.paths.source_dir.clone(),
                    StepDir::Build => self.paths.build_subdir.clone().ok_or_else(|| {
                        InstallError::validation(format!(
                            "step '{}' needs a build tree but {} has none",
                            step.name, self.package
                        ))
                    })?,
                };
                let mut env = common_env.clone();
                for (key, value) in &step.env {
                    env.insert(key.clone(), expand(value, &vars)?);
                }
                prepared.push((
                    phase,
                    PreparedStep {
                        name: step.name.clone(),
                        command: expand(&step.run, &vars)?,
                        cwd,
                        env,
                    },
                ));
            }
        }
        Ok(prepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{InstallLayout, PackageTable};

    fn dirac_context(mode: BuildMode) -> InstallContext {
        let layout = InstallLayout::new("/h/sources", "/h/builds");
        let mut deps = BTreeMap::from([(
            "openblas".to_string(),
            PathBuf::from("/h/builds/openblas/default"),
        )]);
        if mode == BuildMode::Parallel {
            deps.insert("openmpi".into(), PathBuf::from("/h/builds/openmpi/default"));
        }
        InstallContext {
            package: "dirac".into(),
            spec: VersionSpec::Release("25.0".into()),
            version: "25.0".into(),
            variant: Some("ilp64".into()),
            mode,
            jobs: 4,
            paths: layout.paths("dirac", "25.0", Some("ilp64"), true).unwrap(),
            link_path: layout.link_path("dirac", "default").unwrap(),
            deps,
        }
    }

    #[test]
    fn test_template_vars() {
        let table = PackageTable::builtin().unwrap();
        let ctx = dirac_context(BuildMode::Parallel);
        let vars = ctx.template_vars(table.get("dirac").unwrap());

        assert_eq!(vars["prefix"], "/h/builds/dirac/25.0-ilp64");
        assert_eq!(vars["build_subdir"], "/h/builds/dirac/25.0-ilp64/build");
        assert_eq!(vars["source_dir"], "/h/sources/dirac-25.0");
        assert_eq!(vars["variant_args"], "--int64");
        assert_eq!(vars["dep.openmpi"], "/h/builds/openmpi/default");
        assert_eq!(vars["major_minor"], "25.0");
    }

    #[test]
    fn test_prepare_steps_serial_dirac() {
        let table = PackageTable::builtin().unwrap();
        let ctx = dirac_context(BuildMode::Serial);
        let steps = ctx.prepare_steps(table.get("dirac").unwrap()).unwrap();

        let names: Vec<_> = steps.iter().map(|(_, s)| s.name.as_str()).collect();
        assert_eq!(names, vec!["setup", "compile", "install"]);

        let (phase, setup) = &steps[0];
        assert_eq!(*phase, Phase::Configure);
        assert_eq!(setup.cwd, PathBuf::from("/h/sources/dirac-25.0"));
        assert!(setup.command.contains("--int64"));
        assert!(setup.command.ends_with("/h/builds/dirac/25.0-ilp64/build"));
        assert_eq!(setup.env["MATH_ROOT"], "/h/builds/openblas/default");

        assert_eq!(steps[1].1.cwd, PathBuf::from("/h/builds/dirac/25.0-ilp64/build"));
    }

    #[test]
    fn test_prepare_steps_parallel_uses_mpi_setup() {
        let table = PackageTable::builtin().unwrap();
        let ctx = dirac_context(BuildMode::Parallel);
        let steps = ctx.prepare_steps(table.get("dirac").unwrap()).unwrap();

        assert_eq!(steps[0].1.name, "setup-mpi");
        assert!(
            steps[0]
                .1
                .command
                .starts_with("PATH=/h/builds/openmpi/default/bin:$PATH ./setup")
        );
    }

    #[test]
    fn test_prepare_steps_missing_dep_placeholder_fails() {
        let table = PackageTable::builtin().unwrap();
        let mut ctx = dirac_context(BuildMode::Parallel);
        ctx.deps.remove("openmpi");

        let err = ctx.prepare_steps(table.get("dirac").unwrap()).unwrap_err();
        assert!(err.to_string().contains("dep.openmpi"));
    }
}

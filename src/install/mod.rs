//! The install pipeline.
//!
//! A run walks [`InstallState`] in order and stops at the first fatal
//! error, which names the failing step. Only archiving and source cleanup
//! are best effort; the default link is switched last, after the installed
//! tree passed verification, so a failed run never moves it.

mod context;
mod deps;
mod symlink;
mod verify;

use anyhow::Result;
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::cache::{ArchiveCache, CleanupOutcome, SourceOrigin};
use crate::error::InstallError;
use crate::fetch::SourceFetcher;
use crate::package::{
    BuildMode, DEFAULT_LINK_NAME, InstallLayout, PackageDescriptor, PackageTable, Phase,
    VersionResolver, VersionSpec,
};
use crate::runner::{BuildRunner, PreparedStep, StepStatus};
use crate::runtime::path::normalize_path;
use crate::runtime::{PackageLock, Runtime};

pub use context::InstallContext;
pub use deps::{DepOverride, check_tools, locate, resolve_dependencies};
pub use symlink::{
    LinkChange, check_slot as check_link_slot, current as current_link, point as point_link,
};
pub use verify::{VERIFY_STEP, verify_install};

/// Step name reported when the default link cannot be switched.
pub const SYMLINK_STEP: &str = "symlink";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallState {
    Start,
    ArgsParsed,
    DepsChecked,
    VersionResolved,
    SourceReady,
    Configured,
    Built,
    Installed,
    Archived,
    Symlinked,
    Verified,
}

impl InstallState {
    fn after(phase: Phase) -> Self {
        match phase {
            Phase::Configure => InstallState::Configured,
            Phase::Build => InstallState::Built,
            Phase::Install => InstallState::Installed,
        }
    }
}

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub package: String,
    /// Version token; `None` builds the descriptor's default development ref
    pub version: Option<String>,
    pub variant: Option<String>,
    pub link_name: String,
    /// Treat even a digit-leading token as a development ref
    pub force_dev: bool,
    pub mode: BuildMode,
    pub deps: Vec<DepOverride>,
    pub jobs: usize,
    pub keep_source: bool,
}

impl InstallRequest {
    pub fn new(package: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            package: package.into(),
            version: version.map(str::to_string),
            variant: None,
            link_name: DEFAULT_LINK_NAME.to_string(),
            force_dev: false,
            mode: BuildMode::default(),
            deps: Vec::new(),
            jobs: 1,
            keep_source: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Archive(SourceOrigin),
    Checkout { git_url: String, reference: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub context: InstallContext,
    pub source: SourceKind,
    pub cleanup: CleanupOutcome,
    pub link: LinkChange,
}

impl InstallReport {
    pub fn install_dir(&self) -> &Path {
        &self.context.paths.build_dir
    }
}

pub struct Installer<R: Runtime, F: SourceFetcher, B: BuildRunner> {
    pub runtime: R,
    pub fetcher: F,
    pub runner: B,
    pub layout: InstallLayout,
    pub packages: PackageTable,
}

impl<R: Runtime, F: SourceFetcher, B: BuildRunner> Installer<R, F, B> {
    pub fn new(
        runtime: R,
        fetcher: F,
        runner: B,
        layout: InstallLayout,
        packages: PackageTable,
    ) -> Self {
        Self {
            runtime,
            fetcher,
            runner,
            layout,
            packages,
        }
    }

    #[tracing::instrument(skip(self, request), fields(package = %request.package))]
    pub async fn install(&self, request: &InstallRequest) -> Result<InstallReport> {
        let mut state = InstallState::Start;
        let result = self.run(request, &mut state).await;
        if let Err(e) = &result {
            debug!("{} failed after {:?}: {:#}", request.package, state, e);
        }
        result
    }

    async fn run(
        &self,
        request: &InstallRequest,
        state: &mut InstallState,
    ) -> Result<InstallReport> {
        let descriptor = self.packages.get(&request.package)?;
        let spec = version_spec(descriptor, request)?;
        let variant = descriptor.select_variant(request.variant.as_deref())?;
        let link_path = self.layout.link_path(&descriptor.name, &request.link_name)?;
        if request.jobs == 0 {
            return Err(InstallError::validation("--jobs must be at least 1").into());
        }
        match &spec {
            VersionSpec::Release(tag) => {
                if descriptor.release_url.is_none() {
                    return Err(InstallError::validation(format!(
                        "{} has no release downloads; build a development ref with --dev",
                        descriptor.name
                    ))
                    .into());
                }
                self.layout
                    .paths(&descriptor.name, tag, variant.as_deref(), descriptor.build_subdir)?;
            }
            VersionSpec::Development(_) if descriptor.git_url.is_none() => {
                return Err(InstallError::validation(format!(
                    "{} has no repository for development builds",
                    descriptor.name
                ))
                .into());
            }
            VersionSpec::Development(_) => {}
        }
        advance(state, InstallState::ArgsParsed);

        let mut tools = descriptor.tools.clone();
        if !spec.is_release() && !tools.iter().any(|t| t == "git") {
            tools.push("git".to_string());
        }
        check_tools(&self.runtime, &descriptor.name, &tools)?;
        let deps = resolve_dependencies(
            &self.runtime,
            &self.layout,
            descriptor,
            request.mode,
            variant.as_deref(),
            &request.deps,
        )?;
        advance(state, InstallState::DepsChecked);

        let _lock = lock_package(&self.runtime, &self.layout, &descriptor.name)?;
        let cache = ArchiveCache::new(&self.runtime, &self.fetcher, self.layout.source_root());

        println!("   resolving {} {}", descriptor.name, spec);
        let checkout = match &spec {
            VersionSpec::Release(_) => None,
            VersionSpec::Development(reference) => {
                let git_url = descriptor.git_url.as_deref().unwrap_or_default();
                let staging = self.staging_dir(&descriptor.name);
                cache
                    .checkout(git_url, reference, &staging)
                    .await
                    .map_err(|e| InstallError::fetch(format!("{} ({})", git_url, reference), &e))?;
                Some(staging)
            }
        };
        let version = VersionResolver::new(&self.runtime).resolve(&spec, checkout.as_deref());
        let planned = self.plan(descriptor, request, &spec, &version, variant, link_path, deps);
        let (ctx, steps) = match planned {
            Ok(planned) => planned,
            Err(e) => {
                if let Some(staging) = &checkout {
                    if let Err(cleanup) = self.runtime.remove_dir_all(staging) {
                        warn!("Failed to remove checkout {:?}: {:#}", staging, cleanup);
                    }
                }
                return Err(e.into());
            }
        };
        advance(state, InstallState::VersionResolved);

        let source = match checkout {
            Some(staging) => {
                self.promote_checkout(&staging, &ctx.paths.source_dir)
                    .map_err(|e| InstallError::fetch(spec.token(), &e))?;
                SourceKind::Checkout {
                    git_url: descriptor.git_url.clone().unwrap_or_default(),
                    reference: spec.token().to_string(),
                }
            }
            None => {
                let url = descriptor.release_url_for(&ctx.version).unwrap_or_default();
                println!("   fetching {}", url);
                let origin = cache
                    .fetch_or_use(&url, &ctx.paths.archive_stem, &ctx.paths.source_dir)
                    .await
                    .map_err(|e| InstallError::fetch(&url, &e))?;
                SourceKind::Archive(origin)
            }
        };
        let work_dir = ctx.paths.build_subdir.as_ref().unwrap_or(&ctx.paths.build_dir);
        self.runtime.create_dir_all(work_dir)?;
        advance(state, InstallState::SourceReady);

        for phase in [Phase::Configure, Phase::Build, Phase::Install] {
            for (_, step) in steps.iter().filter(|(p, _)| *p == phase) {
                self.run_step(step).await?;
            }
            advance(state, InstallState::after(phase));
        }
        verify_install(&self.runtime, &ctx.paths.build_dir, &descriptor.verify)?;

        let cleanup = cache.archive_and_clean(
            &ctx.paths.source_dir,
            &ctx.paths.archive_stem,
            request.keep_source,
        );
        advance(state, InstallState::Archived);

        let link = point_link(&self.runtime, &ctx.link_path, &ctx.paths.dir_name)
            .map_err(|e| InstallError::build(SYMLINK_STEP, format!("{:#}", e)))?;
        advance(state, InstallState::Symlinked);

        self.confirm_link(&ctx)?;
        advance(state, InstallState::Verified);

        Ok(InstallReport {
            context: ctx,
            source,
            cleanup,
            link,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn plan(
        &self,
        descriptor: &PackageDescriptor,
        request: &InstallRequest,
        spec: &VersionSpec,
        version: &str,
        variant: Option<String>,
        link_path: PathBuf,
        deps: std::collections::BTreeMap<String, PathBuf>,
    ) -> Result<(InstallContext, Vec<(Phase, PreparedStep)>), InstallError> {
        let paths = self.layout.paths(
            &descriptor.name,
            version,
            variant.as_deref(),
            descriptor.build_subdir,
        )?;
        check_link_slot(&self.runtime, &link_path, &paths.dir_name)?;
        let ctx = InstallContext {
            package: descriptor.name.clone(),
            spec: spec.clone(),
            version: version.to_string(),
            variant,
            mode: request.mode,
            jobs: request.jobs,
            paths,
            link_path,
            deps,
        };
        let steps = ctx.prepare_steps(descriptor)?;
        Ok((ctx, steps))
    }

    /// Clone target for development refs; the package lock makes it unique.
    fn staging_dir(&self, package: &str) -> PathBuf {
        self.layout
            .source_root()
            .join(format!(".{}.checkout", package))
    }

    fn promote_checkout(&self, staging: &Path, source_dir: &Path) -> Result<()> {
        if self.runtime.exists(source_dir) {
            self.runtime.remove_dir_all(source_dir)?;
        }
        self.runtime.rename(staging, source_dir)
    }

    async fn run_step(&self, step: &PreparedStep) -> Result<(), InstallError> {
        println!("   running {}", step.name);
        match self.runner.run(step).await {
            Ok(StepStatus::Success) => Ok(()),
            Ok(status) => Err(InstallError::build(&step.name, status.to_string())),
            Err(e) => Err(InstallError::build(&step.name, format!("{:#}", e))),
        }
    }

    /// Read the link back and make sure it lands on the install directory.
    fn confirm_link(&self, ctx: &InstallContext) -> Result<(), InstallError> {
        let resolved = self
            .runtime
            .resolve_link(&ctx.link_path)
            .map_err(|e| InstallError::build(SYMLINK_STEP, format!("{:#}", e)))?;
        if normalize_path(&resolved) != normalize_path(&ctx.paths.build_dir) {
            return Err(InstallError::build(
                SYMLINK_STEP,
                format!(
                    "{} resolves to {}, expected {}",
                    ctx.link_path.display(),
                    resolved.display(),
                    ctx.paths.build_dir.display()
                ),
            ));
        }
        Ok(())
    }
}

/// Take the per-package lock; a held lock means another run owns the package.
pub fn lock_package<R: Runtime>(
    runtime: &R,
    layout: &InstallLayout,
    package: &str,
) -> Result<PackageLock> {
    let lock_path = layout.lock_path(package)?;
    if let Some(parent) = lock_path.parent() {
        runtime.create_dir_all(parent)?;
    }
    match runtime.lock_exclusive(&lock_path)? {
        Some(lock) => Ok(lock),
        None => Err(InstallError::validation(format!(
            "another install of {} is running (lock held on {})",
            package,
            lock_path.display()
        ))
        .into()),
    }
}

fn version_spec(
    descriptor: &PackageDescriptor,
    request: &InstallRequest,
) -> Result<VersionSpec, InstallError> {
    match &request.version {
        Some(token) => VersionSpec::parse(token, request.force_dev),
        None if descriptor.git_url.is_some() => {
            Ok(VersionSpec::Development(descriptor.default_ref.clone()))
        }
        None => Err(InstallError::validation(format!(
            "a version is required for {}",
            descriptor.name
        ))),
    }
}

fn advance(state: &mut InstallState, next: InstallState) {
    debug!("{:?} -> {:?}", state, next);
    *state = next;
}

//! Package descriptors, version resolution and install layout.
//!
//! Everything in here is pure or reads the filesystem only; nothing builds,
//! downloads or mutates an install.

mod descriptor;
mod layout;
pub mod template;
mod version;

pub use descriptor::{
    BUILD_SUBDIR_PLACEHOLDER, BuildMode, BuildStep, DEP_PLACEHOLDER_PREFIX, DependencySpec,
    PackageDescriptor, PackageTable, Phase, STANDARD_PLACEHOLDERS, StepDir, VerifyCheck,
    VerifyKind, major_minor,
};
pub use layout::{BUILD_SUBDIR, DEFAULT_LINK_NAME, InstallLayout, InstallPaths, LOCK_FILE};
pub use version::{DEV_SUFFIX, VersionResolver, VersionSpec};

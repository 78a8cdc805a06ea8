//! Typed failures of an install run.
//!
//! Everything that aborts a run is an [`InstallError`], carried through
//! `anyhow::Result` so callers can keep adding context. `main` recovers the
//! variant with [`exit_code`] to pick the process exit status. Best-effort
//! failures (archiving, source cleanup) are never errors; they are logged
//! with `warn!` where they happen.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    /// Bad or empty version, unknown variant, malformed descriptor input.
    #[error("{0}")]
    Validation(String),

    #[error("required tool '{tool}' not found in PATH (needed to build {package})")]
    MissingTool { tool: String, package: String },

    #[error(
        "dependency {package} not found at {}; install it first with: {install_hint}",
        expected.display()
    )]
    MissingPackage {
        package: String,
        expected: PathBuf,
        install_hint: String,
    },

    #[error("failed to fetch {source_ref}: {reason}")]
    Fetch { source_ref: String, reason: String },

    #[error("step '{step}' failed: {reason}")]
    Build { step: String, reason: String },
}

impl InstallError {
    pub fn validation(message: impl Into<String>) -> Self {
        InstallError::Validation(message.into())
    }

    pub fn fetch(source_ref: impl Into<String>, err: &anyhow::Error) -> Self {
        InstallError::Fetch {
            source_ref: source_ref.into(),
            reason: format!("{:#}", err),
        }
    }

    pub fn build(step: impl Into<String>, reason: impl Into<String>) -> Self {
        InstallError::Build {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallError::Validation(_) => 2,
            InstallError::MissingTool { .. } | InstallError::MissingPackage { .. } => 3,
            InstallError::Fetch { .. } => 4,
            InstallError::Build { .. } => 5,
        }
    }
}

/// Exit status for any error: the typed class if one is in the chain, else 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<InstallError>())
        .map(InstallError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes_by_class() {
        assert_eq!(InstallError::validation("bad").exit_code(), 2);
        assert_eq!(
            InstallError::MissingTool {
                tool: "cmake".into(),
                package: "dirac".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(InstallError::build("make", "exit status 2").exit_code(), 5);
    }

    #[test]
    fn test_exit_code_found_through_context() {
        let err = anyhow::Error::from(InstallError::build("configure", "exit status 1"))
            .context("Installing openmpi");
        assert_eq!(exit_code(&err), 5);

        let plain = Err::<(), _>(std::io::Error::other("disk full"))
            .context("writing archive")
            .unwrap_err();
        assert_eq!(exit_code(&plain), 1);
    }

    #[test]
    fn test_missing_package_message_names_path_and_installer() {
        let err = InstallError::MissingPackage {
            package: "openmpi".into(),
            expected: PathBuf::from("/b/openmpi/default"),
            install_hint: "hpcbuild install openmpi <VERSION>".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/b/openmpi/default"));
        assert!(msg.contains("hpcbuild install openmpi"));
    }

    #[test]
    fn test_fetch_flattens_cause_chain() {
        let cause = anyhow::anyhow!("connection refused").context("GET https://x/y.tar.gz");
        let err = InstallError::fetch("https://x/y.tar.gz", &cause);
        assert_eq!(
            err.to_string(),
            "failed to fetch https://x/y.tar.gz: GET https://x/y.tar.gz: connection refused"
        );
    }
}

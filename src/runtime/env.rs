//! Well-known directories, tool lookup and the wall clock.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn which_impl(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }

    pub(crate) fn now_impl(&self) -> DateTime<Local> {
        Local::now()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn current_dir_impl(&self) -> Result<PathBuf> {
        std::env::current_dir().context("Failed to read the current directory")
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn home_dir_impl(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn config_dir_impl(&self) -> Option<PathBuf> {
        dirs::config_dir()
    }
}

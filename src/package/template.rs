//! `{placeholder}` expansion for descriptor commands and environment values.
//!
//! Placeholders are lowercase names in braces (`{prefix}`, `{dep.openmpi}`).
//! Shell parameter expansions such as `${HOME}` and anything that does not
//! look like a placeholder are left untouched.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::InstallError;

pub type TemplateVars = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$?\{([a-z][a-z0-9_.\-]*)\}").expect("valid regex"));

/// Names of all placeholders used in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .filter(|caps| !caps[0].starts_with('$'))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Substitute every placeholder. An unknown name is a validation error.
pub fn expand(template: &str, vars: &TemplateVars) -> Result<String, InstallError> {
    let mut missing = None;
    let expanded = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        if caps[0].starts_with('$') {
            return caps[0].to_string();
        }
        match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                caps[0].to_string()
            }
        }
    });
    match missing {
        Some(name) => Err(InstallError::validation(format!(
            "unknown placeholder {{{}}} in '{}'",
            name, template
        ))),
        None => Ok(expanded.into_owned()),
    }
}

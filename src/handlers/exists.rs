//! Read-only presence assertions
//!
//! A failed assertion is a reported failure (`failed = true`) rather than
//! an error; dry-run and apply behave identically.

use super::Invocation;
use crate::io::lstat;
use crate::params::{self, PathParams};
use crate::resource::{ApplyResult, Outcome, ResourceDescriptor};
use crate::validation::require_name;

/// Succeeds iff something exists at `name`
pub fn exists(_inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let params: PathParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;

    if attempt!(result, lstat(&path)).is_some() {
        result.note(format!("{} exists", path.display()));
        result.succeed()
    } else {
        result.note(format!("{} does not exist", path.display()));
        result.report_failure()
    }
}

/// Succeeds iff nothing exists at `name`
pub fn missing(_inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let params: PathParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;

    if attempt!(result, lstat(&path)).is_none() {
        result.note(format!("{} is missing", path.display()));
        result.succeed()
    } else {
        result.note(format!("{} exists but should be missing", path.display()));
        result.report_failure()
    }
}

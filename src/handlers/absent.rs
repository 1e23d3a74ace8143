use super::Invocation;
use crate::io::lstat;
use crate::params::{self, PathParams};
use crate::resource::{ApplyResult, Outcome, ResourceDescriptor};
use crate::validation::{guard_delete, require_name};
use std::fs;
use tracing::info;

/// Ensure nothing exists at `name`
///
/// Files, symlinks and empty directories are removed. A non-empty
/// directory is never removed recursively; the OS error surfaces as is.
pub fn apply(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let params: PathParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;
    attempt!(result, guard_delete(&path));

    let meta = match attempt!(result, lstat(&path)) {
        Some(meta) => meta,
        None => {
            result.note(format!("{} is already absent", path.display()));
            return result.succeed();
        }
    };

    if inv.dry_run {
        result.note(format!("{} would be deleted", path.display()));
        result.mark_changed();
        return result.succeed();
    }

    if meta.is_dir() {
        attempt!(result, fs::remove_dir(&path));
    } else {
        attempt!(result, fs::remove_file(&path));
    }
    info!("Deleted {:?}", path);
    result.note(format!("{} has been deleted", path.display()));
    result.mark_changed();
    result.succeed()
}

use super::Invocation;
use crate::error::ConvergeError;
use crate::io::lstat;
use crate::params::{self, SymlinkParams};
use crate::resource::{ApplyResult, Outcome, ResourceDescriptor};
use crate::validation::{clean_path, guard_modify, require_name};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::PathBuf;
use tracing::{debug, info};

/// Ensure `name` is a symlink pointing at `target`
///
/// An existing link to the same target is left alone. Any other existing
/// entry is refused; `force`, `backup` and ownership parameters are
/// accepted but not acted on.
pub fn apply(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let params: SymlinkParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;
    let target = match params.target.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => PathBuf::from(t),
        _ => return result.fail(ConvergeError::MissingTarget(desc.id.clone())),
    };
    attempt!(result, guard_modify(&path));
    attempt!(result, guard_modify(&target));

    if params.force || params.backup.is_some() || params.user.is_some() || params.group.is_some() {
        debug!("Symlink '{}': force/backup/ownership parameters are ignored", desc.id);
    }

    if let Some(meta) = attempt!(result, lstat(&path)) {
        if meta.file_type().is_symlink() {
            let current = attempt!(result, fs::read_link(&path));
            if clean_path(&current) == clean_path(&target) {
                result.note(format!(
                    "{} already points to {}",
                    path.display(),
                    target.display()
                ));
                return result.succeed();
            }
        }
        result.note(format!(
            "{} exists and is not a link to {}",
            path.display(),
            target.display()
        ));
        return result.fail(ConvergeError::PathExists(path));
    }

    attempt!(result, inv.prepare_parent(&mut result, &path, params.makedirs));

    result.note(format!(
        "{} symlink {} -> {}",
        inv.verb("would create", "created"),
        path.display(),
        target.display()
    ));
    result.mark_changed();
    if !inv.dry_run {
        attempt!(result, symlink(&target, &path));
        info!("Linked {:?} -> {:?}", path, target);
    }
    result.succeed()
}

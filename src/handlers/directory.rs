use super::Invocation;
use crate::error::{ConvergeError, Result};
use crate::io::{lstat, mode_bits, resolve_gid, resolve_uid, walk};
use crate::params::{self, DirectoryParams};
use crate::resource::{ApplyResult, Outcome, ResourceDescriptor};
use crate::validation::{guard_modify, parse_mode, require_name};
use std::fs::{self, Metadata, Permissions};
use std::io;
use std::os::unix::fs::{lchown, MetadataExt, PermissionsExt};
use std::path::Path;
use tracing::info;

/// One independently gated attribute sub-step
struct Step<'s> {
    label: String,
    max_depth: usize,
    applies: &'s dyn Fn(&Metadata) -> bool,
    differs: &'s dyn Fn(&Metadata) -> bool,
    fix: &'s dyn Fn(&Path) -> io::Result<()>,
}

/// Walk the tree for one step, noting and (unless dry-run) fixing drift
///
/// `planned` is set when the directory itself does not exist yet under
/// dry-run, so there is nothing to inspect.
fn converge_step(
    inv: &Invocation<'_>,
    result: &mut ApplyResult,
    root: &Path,
    planned: bool,
    step: Step<'_>,
) -> Result<()> {
    if planned {
        result.note(format!(
            "would converge {} under {} once created",
            step.label,
            root.display()
        ));
        return Ok(());
    }

    let mut drifted = 0usize;
    walk(root, step.max_depth, &mut |path, meta| {
        if (step.applies)(meta) && (step.differs)(meta) {
            drifted += 1;
            if !inv.dry_run {
                (step.fix)(path)?;
            }
        }
        Ok(())
    })?;

    if drifted == 0 {
        result.note(format!("{} already set on {}", step.label, root.display()));
    } else {
        result.note(format!(
            "{} {} on {} entries under {}",
            inv.verb("would set", "set"),
            step.label,
            drifted,
            root.display()
        ));
        result.mark_changed();
    }
    Ok(())
}

/// Ensure a directory exists, then converge owner, group and modes
///
/// Each attribute is its own walk, gated on the parameter being present
/// and recursive only when `recurse` is set. `file_mode` without `recurse`
/// applies to the files directly inside the directory.
pub fn apply(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let params: DirectoryParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;
    attempt!(result, guard_modify(&path));

    let uid = match params.user.as_deref() {
        Some(user) => Some(attempt!(result, resolve_uid(user))),
        None => None,
    };
    let gid = match params.group.as_deref() {
        Some(group) => Some(attempt!(result, resolve_gid(group))),
        None => None,
    };
    let dir_mode = match params.dir_mode.as_deref() {
        Some(mode) => Some(attempt!(result, parse_mode(mode))),
        None => None,
    };
    let file_mode = match params.file_mode.as_deref() {
        Some(mode) => Some(attempt!(result, parse_mode(mode))),
        None => None,
    };

    let mut planned = false;
    match attempt!(result, lstat(&path)) {
        Some(meta) if meta.is_dir() => {
            result.note(format!("directory {} exists", path.display()));
        }
        Some(_) => {
            result.note(format!("{} exists and is not a directory", path.display()));
            return result.fail(ConvergeError::PathExists(path));
        }
        None => {
            attempt!(result, inv.prepare_parent(&mut result, &path, params.makedirs));
            result.note(format!(
                "{} directory {}",
                inv.verb("would create", "created"),
                path.display()
            ));
            result.mark_changed();
            if inv.dry_run {
                planned = true;
            } else {
                attempt!(result, fs::create_dir(&path));
                info!("Created directory {:?}", path);
            }
        }
    }

    let depth = if params.recurse { usize::MAX } else { 0 };

    if let Some(uid) = uid {
        let step = Step {
            label: format!("owner {}", uid),
            max_depth: depth,
            applies: &|_: &Metadata| true,
            differs: &|meta: &Metadata| meta.uid() != uid,
            fix: &|p: &Path| lchown(p, Some(uid), None),
        };
        attempt!(result, converge_step(inv, &mut result, &path, planned, step));
    }

    if let Some(gid) = gid {
        let step = Step {
            label: format!("group {}", gid),
            max_depth: depth,
            applies: &|_: &Metadata| true,
            differs: &|meta: &Metadata| meta.gid() != gid,
            fix: &|p: &Path| lchown(p, None, Some(gid)),
        };
        attempt!(result, converge_step(inv, &mut result, &path, planned, step));
    }

    if let Some(mode) = dir_mode {
        let step = Step {
            label: format!("directory mode {:04o}", mode),
            max_depth: depth,
            applies: &|meta: &Metadata| meta.is_dir(),
            differs: &|meta: &Metadata| mode_bits(meta) != mode,
            fix: &|p: &Path| fs::set_permissions(p, Permissions::from_mode(mode)),
        };
        attempt!(result, converge_step(inv, &mut result, &path, planned, step));
    }

    if let Some(mode) = file_mode {
        let step = Step {
            label: format!("file mode {:04o}", mode),
            max_depth: if params.recurse { usize::MAX } else { 1 },
            applies: &|meta: &Metadata| meta.is_file(),
            differs: &|meta: &Metadata| mode_bits(meta) != mode,
            fix: &|p: &Path| fs::set_permissions(p, Permissions::from_mode(mode)),
        };
        attempt!(result, converge_step(inv, &mut result, &path, planned, step));
    }

    result.succeed()
}

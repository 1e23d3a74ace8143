use super::Invocation;
use crate::error::{ConvergeError, Result};
use crate::io::{atomic_write, lstat, mode_bits, resolve_gid, resolve_uid};
use crate::params::{self, ManagedParams, SourceParams};
use crate::pipeline;
use crate::resource::{ApplyResult, Outcome, ResourceDescriptor};
use crate::validation::{guard_modify, parse_mode, require_name};
use std::fs::{self, Permissions};
use std::os::unix::fs::{lchown, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::info;

/// Desired attributes of the managed file
struct Attributes {
    mode: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
}

impl Attributes {
    fn is_empty(&self) -> bool {
        self.mode.is_none() && self.uid.is_none() && self.gid.is_none()
    }
}

fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Bring mode and ownership in line; the file must already exist
fn converge_attributes(
    inv: &Invocation<'_>,
    result: &mut ApplyResult,
    path: &Path,
    wanted: &Attributes,
) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;

    if let Some(mode) = wanted.mode {
        if mode_bits(&meta) != mode {
            result.note(format!(
                "{} mode of {} to {:04o}",
                inv.verb("would set", "set"),
                path.display(),
                mode
            ));
            result.mark_changed();
            if !inv.dry_run {
                fs::set_permissions(path, Permissions::from_mode(mode))?;
            }
        }
    }

    let uid = wanted.uid.filter(|uid| meta.uid() != *uid);
    let gid = wanted.gid.filter(|gid| meta.gid() != *gid);
    if uid.is_some() || gid.is_some() {
        result.note(format!(
            "{} ownership of {}",
            inv.verb("would change", "changed"),
            path.display()
        ));
        result.mark_changed();
        if !inv.dry_run {
            lchown(path, uid, gid)?;
        }
    }
    Ok(())
}

/// Keep a file identical to a cached remote source
///
/// Mode and owner are converged even when the content already matches.
pub fn apply(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let params: ManagedParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;
    attempt!(result, guard_modify(&path));

    if params.source.as_deref().map_or(true, |s| s.trim().is_empty()) {
        return result.fail(ConvergeError::MissingSource(desc.id.clone()));
    }

    let wanted = Attributes {
        mode: match params.mode.as_deref() {
            Some(mode) => Some(attempt!(result, parse_mode(mode))),
            None => None,
        },
        uid: match params.user.as_deref() {
            Some(user) => Some(attempt!(result, resolve_uid(user))),
            None => None,
        },
        gid: match params.group.as_deref() {
            Some(group) => Some(attempt!(result, resolve_gid(group))),
            None => None,
        },
    };

    let sources = SourceParams {
        source: params.source.clone(),
        source_hash: params.source_hash.clone(),
        skip_verify: params.skip_verify,
        ..SourceParams::default()
    };
    let desired = attempt!(result, pipeline::resolve(inv, desc, &sources, &mut result));

    let existing = attempt!(result, lstat(&path));
    if existing.is_none() && !params.create {
        result.note(format!(
            "{} does not exist and create is off, leaving it absent",
            path.display()
        ));
        return result.succeed();
    }

    let current = match existing {
        Some(_) => Some(attempt!(result, fs::read(&path))),
        None => None,
    };

    if current.as_deref() == Some(desired.as_slice()) {
        result.note(format!("{} is up to date", path.display()));
    } else {
        if current.is_none() {
            attempt!(result, inv.prepare_parent(&mut result, &path, params.makedirs));
        }

        let suffix = params.backup.as_ref().and_then(|b| b.suffix());
        if let (Some(suffix), Some(_)) = (suffix, &current) {
            let backup = backup_path(&path, &suffix);
            result.note(format!(
                "{} {} to {}",
                inv.verb("would back up", "backed up"),
                path.display(),
                backup.display()
            ));
            if !inv.dry_run {
                attempt!(result, fs::copy(&path, &backup));
            }
        }

        result.note(format!(
            "{} {} from {}",
            inv.verb("would update", "updated"),
            path.display(),
            params.source.as_deref().unwrap_or_default().trim()
        ));
        result.mark_changed();

        if !inv.dry_run {
            attempt!(result, atomic_write(&path, &desired, wanted.mode));
            info!("Updated managed file {:?}", path);
        }
    }

    if wanted.is_empty() {
        return result.succeed();
    }
    if inv.dry_run && current.is_none() {
        result.note(format!(
            "would set attributes of {} once created",
            path.display()
        ));
        return result.succeed();
    }
    attempt!(result, converge_attributes(inv, &mut result, &path, &wanted));
    result.succeed()
}

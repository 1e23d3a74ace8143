//! Line containment: `contains`, `append`, `prepend`

use super::Invocation;
use crate::error::{ConvergeError, Result};
use crate::io::{atomic_write, lstat, read_optional};
use crate::params::{self, ContentParams};
use crate::pipeline;
use crate::resource::{ApplyResult, Outcome, ResourceDescriptor};
use crate::validation::{guard_modify, require_name};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// True if every desired line is matched once among the current lines
///
/// Both sides are sorted and walked together, so order does not matter and
/// a line wanted twice must be present twice.
pub fn contains_lines(desired: &str, current: &str) -> bool {
    let mut wanted: Vec<&str> = desired.lines().collect();
    let mut present: Vec<&str> = current.lines().collect();
    wanted.sort_unstable();
    present.sort_unstable();

    let mut cursor = 0;
    for line in wanted {
        while cursor < present.len() && present[cursor] < line {
            cursor += 1;
        }
        if cursor < present.len() && present[cursor] == line {
            cursor += 1;
        } else {
            return false;
        }
    }
    true
}

/// Check the file at `path` against the desired bytes
///
/// A missing file counts as empty.
fn check_containment(path: &Path, desired: &[u8]) -> Result<()> {
    let current = read_optional(path)?.unwrap_or_default();
    let desired = String::from_utf8_lossy(desired);
    let current = String::from_utf8_lossy(&current);
    if contains_lines(&desired, &current) {
        Ok(())
    } else {
        Err(ConvergeError::MissingContent(path.to_path_buf()))
    }
}

/// Succeeds iff the file contains every desired line
///
/// The file is only read, so dry-run and apply reach the same verdict.
/// `changed` is set only when a source had to be fetched into the cache.
pub fn contains(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let params: ContentParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;
    attempt!(result, guard_modify(&path));

    let desired = attempt!(result, pipeline::resolve(inv, desc, &params.sources, &mut result));

    match check_containment(&path, &desired) {
        Ok(()) => {
            result.note(format!("{} contains the desired content", path.display()));
            result.succeed()
        }
        Err(e) => {
            result.note(format!(
                "{} does not contain the desired content",
                path.display()
            ));
            result.fail(e)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    End,
    Start,
}

impl Placement {
    fn verb(self, inv: &Invocation<'_>) -> &'static str {
        match self {
            Placement::End => inv.verb("would append", "appended"),
            Placement::Start => inv.verb("would prepend", "prepended"),
        }
    }
}

/// Raw-add desired bytes at the end or start of an existing file
fn insert(path: &Path, desired: &[u8], placement: Placement) -> Result<()> {
    let current = read_optional(path)?.unwrap_or_default();
    match placement {
        Placement::End => {
            let mut file = OpenOptions::new().append(true).open(path)?;
            if !current.is_empty() && !current.ends_with(b"\n") {
                file.write_all(b"\n")?;
            }
            file.write_all(desired)?;
            file.sync_all()?;
        }
        Placement::Start => {
            let mut merged = desired.to_vec();
            if !merged.is_empty() && !merged.ends_with(b"\n") && !current.is_empty() {
                merged.push(b'\n');
            }
            merged.extend_from_slice(&current);
            atomic_write(path, &merged, None)?;
        }
    }
    Ok(())
}

fn extend(inv: &Invocation<'_>, desc: &ResourceDescriptor, placement: Placement) -> Outcome {
    let params: ContentParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;
    attempt!(result, guard_modify(&path));

    let desired = attempt!(result, pipeline::resolve(inv, desc, &params.sources, &mut result));

    if attempt!(result, lstat(&path)).is_none() {
        attempt!(result, inv.prepare_parent(&mut result, &path, params.makedirs));
        result.note(format!(
            "{} {} with the desired content",
            inv.verb("would create", "created"),
            path.display()
        ));
        result.mark_changed();
        if !inv.dry_run {
            attempt!(result, atomic_write(&path, &desired, None));
            info!("Created {:?}", path);
        }
        return result.succeed();
    }

    match check_containment(&path, &desired) {
        Ok(()) => {
            result.note(format!("{} already contains the desired content", path.display()));
            result.succeed()
        }
        Err(ConvergeError::MissingContent(_)) => {
            let lines = String::from_utf8_lossy(&desired).lines().count();
            result.note(format!(
                "{} {} lines to {}",
                placement.verb(inv),
                lines,
                path.display()
            ));
            result.mark_changed();
            if !inv.dry_run {
                attempt!(result, insert(&path, &desired, placement));
                info!("Added {} lines to {:?}", lines, path);
            }
            result.succeed()
        }
        Err(e) => result.fail(e),
    }
}

/// Ensure the desired lines are present, appending them if not
pub fn append(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    extend(inv, desc, Placement::End)
}

/// Ensure the desired lines are present, prepending them if not
pub fn prepend(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    extend(inv, desc, Placement::Start)
}

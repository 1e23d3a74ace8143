use super::Invocation;
use crate::error::{ConvergeError, Result};
use crate::params::{self, TouchParams};
use crate::resource::{ApplyResult, Outcome, ResourceDescriptor};
use crate::validation::{guard_modify, require_name};
use chrono::DateTime;
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::info;

/// Parse an RFC 3339 timestamp, e.g. `2024-05-01T12:00:00Z`
fn parse_time(value: &str) -> Result<SystemTime> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(SystemTime::from)
        .map_err(|e| ConvergeError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn set_times(path: &Path, atime: SystemTime, mtime: SystemTime) -> io::Result<()> {
    let times = FileTimes::new().set_accessed(atime).set_modified(mtime);
    File::open(path)?.set_times(times)
}

/// Create `name` if needed and converge its access/modification times
///
/// With neither `atime` nor `mtime` given both become now. When only one
/// is given, an existing file keeps its current value for the other.
pub fn apply(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let params: TouchParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;
    attempt!(result, guard_modify(&path));

    let atime = match params.atime.as_deref() {
        Some(v) => Some(attempt!(result, parse_time(v))),
        None => None,
    };
    let mtime = match params.mtime.as_deref() {
        Some(v) => Some(attempt!(result, parse_time(v))),
        None => None,
    };
    let now = SystemTime::now();

    let current = match fs::metadata(&path) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return result.fail(e.into()),
    };

    let Some(meta) = current else {
        attempt!(result, inv.prepare_parent(&mut result, &path, params.makedirs));

        result.note(format!(
            "{} {}",
            inv.verb("would create", "created"),
            path.display()
        ));
        result.mark_changed();
        if !inv.dry_run {
            attempt!(result, File::create(&path));
            attempt!(
                result,
                set_times(&path, atime.unwrap_or(now), mtime.unwrap_or(now))
            );
            info!("Created {:?}", path);
        }
        return result.succeed();
    };

    let current_atime = attempt!(result, meta.accessed());
    let current_mtime = attempt!(result, meta.modified());
    let (atime, mtime) = match (atime, mtime) {
        (None, None) => (now, now),
        (atime, mtime) => (
            atime.unwrap_or(current_atime),
            mtime.unwrap_or(current_mtime),
        ),
    };

    let what = match (current_atime != atime, current_mtime != mtime) {
        (false, false) => {
            result.note(format!("{} timestamps are already current", path.display()));
            return result.succeed();
        }
        (true, false) => "atime",
        (false, true) => "mtime",
        (true, true) => "atime and mtime",
    };

    result.note(format!(
        "{} of {} {}",
        what,
        path.display(),
        inv.verb("would change", "changed")
    ));
    result.mark_changed();
    if !inv.dry_run {
        attempt!(result, set_times(&path, atime, mtime));
        info!("Touched {:?}", path);
    }
    result.succeed()
}

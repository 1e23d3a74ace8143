use super::Invocation;
use crate::io::{atomic_write, read_optional};
use crate::params::{self, ContentParams};
use crate::pipeline;
use crate::resource::{ApplyResult, Outcome, ResourceDescriptor};
use crate::validation::{guard_modify, require_name};
use tracing::info;

/// Make a file's content exactly equal to the resolved bytes
pub fn apply(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let params: ContentParams = params::parse(desc)?;
    let mut result = ApplyResult::new();
    let path = require_name(&desc.id, params.name.as_deref())?;
    attempt!(result, guard_modify(&path));

    let desired = attempt!(result, pipeline::resolve(inv, desc, &params.sources, &mut result));

    let current = attempt!(result, read_optional(&path));
    if current.as_deref() == Some(desired.as_slice()) {
        result.note(format!("{} already has the desired content", path.display()));
        return result.succeed();
    }

    attempt!(result, inv.prepare_parent(&mut result, &path, params.makedirs));

    result.note(format!(
        "{} content of {} ({} bytes)",
        inv.verb("would write", "wrote"),
        path.display(),
        desired.len()
    ));
    result.mark_changed();
    if !inv.dry_run {
        attempt!(result, atomic_write(&path, &desired, None));
        info!("Wrote {} bytes to {:?}", desired.len(), path);
    }
    result.succeed()
}

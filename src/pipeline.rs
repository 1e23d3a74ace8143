//! Content resolution pipeline
//!
//! Builds the desired bytes of a file from, in order:
//!
//! 1. inline `text` (a string or a list, each element on its own line)
//! 2. a single `source`, fetched through a derived `cached` sub-resource
//!    named `"<id>-source"`
//! 3. a `sources` list paired positionally with `source_hashes`, each
//!    fetched through a `cached` sub-resource named by its hash (or
//!    `"<id>-source-<index>"` under `skip_verify`)
//!
//! Every sub-resource is fully applied before its cache entry is read.
//! A failing sub-resource aborts the pipeline; its notes are kept and its
//! error is wrapped in `CacheFailure`. A cache fill (or, under dry-run, a
//! predicted one) marks the parent result changed.
//!
//! Under dry-run nothing is written to the cache. A source that is not
//! cached yet is previewed instead: fetched and verified into memory, so
//! the parent handler sees the same bytes a real apply would.

use crate::cache::cache_destination;
use crate::error::{ConvergeError, Result};
use crate::handlers::{source_request, Invocation};
use crate::params::{CachedParams, SourceParams};
use crate::resource::{ApplyResult, ResourceDescriptor};
use std::fs;
use tracing::debug;

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Check source/hash pairing before anything runs
fn validate(desc: &ResourceDescriptor, params: &SourceParams) -> Result<()> {
    if params.skip_verify {
        return Ok(());
    }
    if non_empty(params.source.as_deref()).is_some()
        && non_empty(params.source_hash.as_deref()).is_none()
    {
        return Err(ConvergeError::MissingHash(desc.id.clone()));
    }
    if params.sources.len() != params.source_hashes.len() {
        return Err(ConvergeError::MissingHash(desc.id.clone()));
    }
    if params.source_hashes.iter().any(|h| h.trim().is_empty()) {
        return Err(ConvergeError::MissingHash(desc.id.clone()));
    }
    Ok(())
}

/// Fetch a not yet cached source into memory without touching the cache
fn preview(inv: &Invocation<'_>, sub: &ResourceDescriptor) -> Result<Vec<u8>> {
    let engine = inv.engine;
    let request = source_request(engine, sub)?;
    debug!("Previewing {} for '{}'", request.source, sub.id);
    let artifact = engine.providers().new_artifact(request)?;
    artifact.preview(&engine.fetch_context())
}

/// Apply one derived `cached` sub-resource and read its bytes
fn fetch(
    inv: &Invocation<'_>,
    parent: &ResourceDescriptor,
    sub_id: String,
    source: &str,
    hash: Option<&str>,
    skip_verify: bool,
    result: &mut ApplyResult,
) -> Result<Vec<u8>> {
    let sub = parent.derive(
        sub_id,
        "cached",
        CachedParams::to_params(source, hash, skip_verify),
    );

    let sub_result = match inv.nested(&sub) {
        Ok(sub_result) => sub_result,
        Err(failure) => {
            result.absorb_notes(&failure.result);
            return Err(ConvergeError::cache_failure(sub.id, failure.error));
        }
    };
    result.absorb_notes(&sub_result);

    if sub_result.changed {
        result.mark_changed();
        if inv.dry_run {
            return preview(inv, &sub).map_err(|e| ConvergeError::cache_failure(&sub.id, e));
        }
    }

    let path = cache_destination(&inv.engine.config().cache_dir, hash, source);
    debug!("Reading cached source {:?} for '{}'", path, parent.id);
    Ok(fs::read(path)?)
}

/// Resolve the desired content for `desc`
///
/// Notes of every sub-resource are appended to `result` in order.
pub fn resolve(
    inv: &Invocation<'_>,
    desc: &ResourceDescriptor,
    params: &SourceParams,
    result: &mut ApplyResult,
) -> Result<Vec<u8>> {
    validate(desc, params)?;

    let mut buffer = Vec::new();

    if let Some(text) = &params.text {
        buffer.extend_from_slice(text.render().as_bytes());
    }

    if let Some(source) = non_empty(params.source.as_deref()) {
        let hash = non_empty(params.source_hash.as_deref());
        let bytes = fetch(
            inv,
            desc,
            format!("{}-source", desc.id),
            source,
            hash,
            params.skip_verify,
            result,
        )?;
        buffer.extend_from_slice(&bytes);
    }

    for (index, source) in params.sources.iter().enumerate() {
        let hash = non_empty(params.source_hashes.get(index).map(String::as_str));
        let sub_id = match (params.skip_verify, hash) {
            (false, Some(hash)) => hash.to_string(),
            _ => format!("{}-source-{}", desc.id, index),
        };
        let bytes = fetch(
            inv,
            desc,
            sub_id,
            source.trim(),
            hash,
            params.skip_verify,
            result,
        )?;
        buffer.extend_from_slice(&bytes);
    }

    Ok(buffer)
}

use super::Invocation;
use crate::cache::{cache_destination, validate_key};
use crate::error::{ConvergeError, Result};
use crate::params::{self, CachedParams};
use crate::provider::SourceRequest;
use crate::resource::{ApplyResult, Outcome, ResourceDescriptor};
use crate::Engine;
use tracing::{debug, info};

/// Validate a `cached` descriptor and bind it to its cache destination
///
/// # Errors
///
/// `MissingSource` without a source, `MissingHash` without a hash unless
/// `skip_verify`, `InvalidDescriptor` for a hash that is not a digest.
pub(crate) fn source_request(engine: &Engine, desc: &ResourceDescriptor) -> Result<SourceRequest> {
    let params: CachedParams = params::parse(desc)?;

    let source = match params.source.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return Err(ConvergeError::MissingSource(desc.id.clone())),
    };
    let hash = params
        .hash
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string);
    match hash.as_deref() {
        Some(hash) => validate_key(&desc.method, hash)?,
        None if !params.skip_verify => return Err(ConvergeError::MissingHash(desc.id.clone())),
        None => {}
    }

    Ok(SourceRequest {
        id: desc.id.clone(),
        destination: cache_destination(&engine.config().cache_dir, hash.as_deref(), &source),
        source,
        hash,
        skip_verify: params.skip_verify,
        params: desc.params.clone(),
    })
}

/// Ensure a source is present and verified in the content-addressed cache
///
/// Re-running against a valid entry is a strict no-op: no download, no
/// change.
pub fn apply(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let mut result = ApplyResult::new();
    let engine = inv.engine;
    let request = attempt!(result, source_request(engine, desc));
    let source = request.source.clone();
    let destination = request.destination.clone();

    let artifact = attempt!(result, engine.providers().new_artifact(request));
    let ctx = engine.fetch_context();

    let valid = match artifact.verify(&ctx) {
        Ok(valid) => valid,
        Err(e) if e.is_not_found() => {
            debug!("{} not cached yet at {:?}", source, destination);
            false
        }
        Err(e) => return result.fail(e),
    };

    if valid {
        result.note(format!("{} is cached at {}", source, destination.display()));
        return result.succeed();
    }

    if inv.dry_run {
        result.note(format!(
            "{} would be downloaded to {}",
            source,
            destination.display()
        ));
        result.mark_changed();
        return result.succeed();
    }

    attempt!(result, artifact.download(&ctx));
    info!("Cached {} at {:?}", source, destination);
    result.note(format!(
        "{} has been downloaded to {}",
        source,
        destination.display()
    ));
    result.mark_changed();
    result.succeed()
}

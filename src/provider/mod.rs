//! Source provider registry
//!
//! A [`Provider`] claims a set of URI schemes and parses a source into an
//! [`Artifact`] bound to a cache destination. Artifacts verify and download
//! themselves. The registry maps each scheme to one provider; the lock is
//! held only across lookup and registration, never across I/O.

mod file;
mod http;

pub use file::FileProvider;
pub use http::HttpProvider;

use crate::cache::StagedEntry;
use crate::error::{ConvergeError, Result};
use crate::hashing::HashRegistry;
use crate::resource::Params;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-call context handed to verify and download
pub struct FetchContext<'a> {
    pub hashes: &'a HashRegistry,
    pub deadline: Option<Instant>,
}

impl<'a> FetchContext<'a> {
    pub fn new(hashes: &'a HashRegistry) -> Self {
        FetchContext {
            hashes,
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Time left before the deadline, if any
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Everything a provider needs to bind a source to a destination
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub id: String,
    pub source: String,
    pub destination: PathBuf,
    pub hash: Option<String>,
    pub skip_verify: bool,
    pub params: Params,
}

/// A source bound to a cache destination
pub trait Artifact: Send {
    /// Check the destination
    ///
    /// Returns `FileNotFound` when nothing is cached yet, `Ok(false)` when
    /// the cached bytes do not match the expected hash.
    fn verify(&self, ctx: &FetchContext<'_>) -> Result<bool>;

    /// Fetch the source into the destination
    fn download(&self, ctx: &FetchContext<'_>) -> Result<()>;

    /// Fetch and verify the source into memory; the destination is untouched
    fn preview(&self, ctx: &FetchContext<'_>) -> Result<Vec<u8>>;
}

/// A capability resolving sources for a set of URI schemes
pub trait Provider: Send + Sync {
    /// Schemes this provider claims
    fn protocols(&self) -> Vec<String>;

    /// Bind a source to a destination
    fn parse(&self, request: SourceRequest) -> Result<Box<dyn Artifact>>;
}

/// Shared destination check for artifacts backed by the cache
pub fn verify_destination(request: &SourceRequest, ctx: &FetchContext<'_>) -> Result<bool> {
    if !request.destination.exists() {
        return Err(ConvergeError::FileNotFound(request.destination.clone()));
    }
    if request.skip_verify {
        return Ok(true);
    }
    let expected = request
        .hash
        .as_deref()
        .ok_or_else(|| ConvergeError::MissingHash(request.id.clone()))?;
    let (actual, matches) = ctx.hashes.verify_file(&request.destination, expected)?;
    if !matches {
        debug!(
            "Cached {:?} has digest {}, expected {}",
            request.destination, actual, expected
        );
    }
    Ok(matches)
}

/// Stream a reader into the destination through a verified staged entry
pub fn store_verified(
    request: &SourceRequest,
    ctx: &FetchContext<'_>,
    reader: &mut dyn Read,
) -> Result<u64> {
    let mut staged = StagedEntry::create(&request.destination)?;
    let written = std::io::copy(reader, staged.writer())?;
    if !request.skip_verify {
        if let Some(expected) = request.hash.as_deref() {
            staged.verify(ctx.hashes, expected)?;
        }
    }
    staged.commit()?;
    Ok(written)
}

/// Read a whole source into memory, verified the same way as a download
///
/// # Errors
///
/// Returns `HashMismatch` if the bytes do not match the expected hash.
pub fn read_verified(
    request: &SourceRequest,
    ctx: &FetchContext<'_>,
    reader: &mut dyn Read,
) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if !request.skip_verify {
        if let Some(expected) = request.hash.as_deref() {
            let (actual, matches) = ctx.hashes.verify_reader(&mut bytes.as_slice(), expected)?;
            if !matches {
                return Err(ConvergeError::HashMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
    }
    Ok(bytes)
}

/// Infer the URI scheme of a source
///
/// A leading `/` means `file`; text before `://` is the scheme.
///
/// # Examples
///
/// ```
/// use converge_rs::provider::resolve_scheme;
///
/// assert_eq!(resolve_scheme("/etc/hosts").unwrap(), "file");
/// assert_eq!(resolve_scheme("HTTPS://example.com/a").unwrap(), "https");
/// assert!(resolve_scheme("example.com/a").is_err());
/// ```
pub fn resolve_scheme(source: &str) -> Result<String> {
    if source.starts_with('/') {
        return Ok("file".to_string());
    }
    match source.split_once("://") {
        Some((scheme, _)) if !scheme.is_empty() => Ok(scheme.to_ascii_lowercase()),
        _ => Err(ConvergeError::UnknownProtocol(source.to_string())),
    }
}

/// Scheme → provider registry
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider under every scheme it claims
    ///
    /// Schemes already taken are skipped; the others are still registered.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateProtocol` listing the skipped schemes, after all
    /// free schemes have been registered.
    pub fn register_provider(&self, provider: Arc<dyn Provider>) -> Result<()> {
        let mut taken = Vec::new();
        {
            let mut providers = self.providers.write();
            for scheme in provider.protocols() {
                let scheme = scheme.to_ascii_lowercase();
                if providers.contains_key(&scheme) {
                    warn!("Protocol '{}' already registered, skipping", scheme);
                    taken.push(scheme);
                    continue;
                }
                debug!("Registered provider for protocol '{}'", scheme);
                providers.insert(scheme, Arc::clone(&provider));
            }
        }

        if taken.is_empty() {
            Ok(())
        } else {
            Err(ConvergeError::DuplicateProtocol(taken.join(", ")))
        }
    }

    /// Provider responsible for a source
    pub fn resolve(&self, source: &str) -> Result<Arc<dyn Provider>> {
        let scheme = resolve_scheme(source)?;
        self.providers
            .read()
            .get(&scheme)
            .cloned()
            .ok_or_else(|| ConvergeError::UnknownProtocol(source.to_string()))
    }

    /// Resolve the provider, then let it parse the request
    pub fn new_artifact(&self, request: SourceRequest) -> Result<Box<dyn Artifact>> {
        let provider = self.resolve(&request.source)?;
        provider.parse(request)
    }

    /// Registered schemes, sorted
    pub fn protocols(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.providers.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

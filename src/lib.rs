//! # Converge - Resource Convergence Engine
//!
//! `converge-rs` is the core of a fleet configuration agent. It takes a
//! declarative resource description and drives the local filesystem toward
//! it, idempotently:
//!
//! - **Filesystem handlers**: absent, exists, missing, touch, symlink,
//!   directory, content, contains, append, prepend, managed
//! - **Content-addressed cache** of remote sources, verified by digest
//! - **Pluggable providers** for source schemes (`file`, `http`, `https`)
//! - **Pluggable hash functions** (`crc32`, `md5`, `sha1`, `sha256`, `sha512`)
//! - **Dry-run** on every handler, with the same notes and `changed` signal
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use converge_rs::{AgentConfig, Engine, ResourceDescriptor, Result};
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(AgentConfig::default())?;
//!
//! let motd = ResourceDescriptor::new("motd", "content")
//!     .with("name", "/etc/motd")
//!     .with("text", "Managed by converge");
//!
//! // Preview first, then apply
//! let preview = engine.apply(&motd, true)?;
//! println!("{}", preview.render_notes());
//!
//! let applied = engine.apply(&motd, false)?;
//! assert!(applied.succeeded);
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom hash functions
//!
//! ```rust,no_run
//! use converge_rs::{AgentConfig, Engine, Result};
//! use std::io::{self, Read};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let engine = Engine::new(AgentConfig::default())?;
//! engine.hashes().register(
//!     "len",
//!     Arc::new(|r: &mut dyn Read| -> io::Result<String> {
//!         let mut buf = Vec::new();
//!         r.read_to_end(&mut buf)?;
//!         Ok(format!("{:x}", buf.len()))
//!     }),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod delegate;
pub mod error;
pub mod handlers;
pub mod hashing;
pub mod io;
pub mod params;
pub mod pipeline;
pub mod provider;
pub mod resource;
pub mod validation;

pub use crate::{
    config::AgentConfig,
    delegate::{Delegator, RemoteTransport},
    error::{ConvergeError, Result},
    handlers::Method,
    hashing::{HashFunc, HashRegistry},
    provider::{Artifact, FetchContext, Provider, ProviderRegistry, SourceRequest},
    resource::{ApplyResult, Failure, Note, Outcome, ResourceDescriptor},
};

use crate::handlers::Invocation;
use crate::provider::{FileProvider, HttpProvider};
use std::sync::Arc;
use tracing::{debug, info};

/// The convergence engine
///
/// Owns the agent configuration and both registries. Cheap to share behind
/// an `Arc`; every `apply` call is independent.
pub struct Engine {
    config: AgentConfig,
    hashes: Arc<HashRegistry>,
    providers: Arc<ProviderRegistry>,
}

impl Engine {
    /// Create an engine with the built-in hashes and providers
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let providers = ProviderRegistry::new();
        providers.register_provider(Arc::new(FileProvider))?;
        providers.register_provider(Arc::new(HttpProvider::new(config.http_timeout())?))?;

        let hashes = HashRegistry::with_builtins();

        info!(
            "Engine ready: cache at {:?}, protocols {:?}, hashes {:?}",
            config.cache_dir,
            providers.protocols(),
            hashes.names()
        );

        Ok(Engine {
            config,
            hashes: Arc::new(hashes),
            providers: Arc::new(providers),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Hash registry, for registering extra algorithms
    pub fn hashes(&self) -> &HashRegistry {
        &self.hashes
    }

    /// Provider registry, for registering extra schemes
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Context for one verify/download exchange
    pub fn fetch_context(&self) -> FetchContext<'_> {
        FetchContext::new(&self.hashes).with_timeout(self.config.http_timeout())
    }

    /// Converge one resource
    ///
    /// With `dry_run` nothing on disk or in the cache is mutated; the
    /// notes and `changed` flag describe what an apply would do.
    pub fn apply(&self, desc: &ResourceDescriptor, dry_run: bool) -> Outcome {
        debug!("apply '{}' ({}), dry_run={}", desc.id, desc.method, dry_run);
        handlers::dispatch(&Invocation::root(self, dry_run), desc)
    }
}

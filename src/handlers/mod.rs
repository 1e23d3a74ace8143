//! Resource handlers, one per convergence method
//!
//! Every handler is synchronous, honours dry-run by running the same
//! inspection logic without mutating anything, and reports through the
//! shared [`ApplyResult`](crate::resource::ApplyResult) contract.

/// Return early with a failure that keeps the notes gathered so far
macro_rules! attempt {
    ($result:ident, $expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => return $result.fail(e.into()),
        }
    };
}

mod absent;
mod cached;
mod contains;
mod content;
mod directory;
mod exists;
mod managed;
mod symlink;
mod touch;

pub(crate) use cached::source_request;

use crate::error::{ConvergeError, Result};
use crate::io::missing_parent;
use crate::resource::{ApplyResult, Failure, Outcome, ResourceDescriptor};
use crate::Engine;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Maximum depth of derived sub-resources
pub const MAX_NESTING_DEPTH: usize = 4;

/// Convergence methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Absent,
    Exists,
    Missing,
    Touch,
    Symlink,
    Directory,
    Content,
    Contains,
    Append,
    Prepend,
    Cached,
    Managed,
}

impl Method {
    pub const ALL: [Method; 12] = [
        Method::Absent,
        Method::Exists,
        Method::Missing,
        Method::Touch,
        Method::Symlink,
        Method::Directory,
        Method::Content,
        Method::Contains,
        Method::Append,
        Method::Prepend,
        Method::Cached,
        Method::Managed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Absent => "absent",
            Method::Exists => "exists",
            Method::Missing => "missing",
            Method::Touch => "touch",
            Method::Symlink => "symlink",
            Method::Directory => "directory",
            Method::Content => "content",
            Method::Contains => "contains",
            Method::Append => "append",
            Method::Prepend => "prepend",
            Method::Cached => "cached",
            Method::Managed => "managed",
        }
    }
}

impl FromStr for Method {
    type Err = ConvergeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ConvergeError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call into the handler layer
pub struct Invocation<'a> {
    pub engine: &'a Engine,
    pub dry_run: bool,
    depth: usize,
}

impl<'a> Invocation<'a> {
    pub fn root(engine: &'a Engine, dry_run: bool) -> Self {
        Invocation {
            engine,
            dry_run,
            depth: 0,
        }
    }

    /// Apply a derived sub-resource one level deeper
    ///
    /// Only `cached` may be nested.
    pub fn nested(&self, desc: &ResourceDescriptor) -> Outcome {
        let depth = self.depth + 1;
        if depth > MAX_NESTING_DEPTH {
            return Err(Failure::bare(ConvergeError::NestingTooDeep(MAX_NESTING_DEPTH)));
        }
        let method: Method = desc.method.parse()?;
        if method != Method::Cached {
            return Err(Failure::bare(ConvergeError::InvalidDescriptor {
                method: desc.method.clone(),
                reason: "only cached resources may be derived".to_string(),
            }));
        }
        debug!("Applying sub-resource '{}' at depth {}", desc.id, depth);
        let child = Invocation {
            engine: self.engine,
            dry_run: self.dry_run,
            depth,
        };
        dispatch(&child, desc)
    }

    /// Verb phrase for notes: what would happen vs what did happen
    pub(crate) fn verb(&self, dry: &'static str, wet: &'static str) -> &'static str {
        if self.dry_run {
            dry
        } else {
            wet
        }
    }

    /// Make sure the parent directory of `path` exists
    ///
    /// A missing parent is created only with `makedirs`, and only outside
    /// dry-run; either way a note records it.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if the parent is missing and `makedirs` is off.
    pub(crate) fn prepare_parent(
        &self,
        result: &mut ApplyResult,
        path: &Path,
        makedirs: bool,
    ) -> Result<()> {
        let Some(parent) = missing_parent(path) else {
            return Ok(());
        };
        if !makedirs {
            result.note(format!("parent directory {} does not exist", parent.display()));
            return Err(ConvergeError::PathNotFound(parent));
        }
        result.note(format!(
            "{} parent directory {}",
            self.verb("would create", "created"),
            parent.display()
        ));
        if !self.dry_run {
            fs::create_dir_all(&parent)?;
        }
        Ok(())
    }
}

/// Route a descriptor to its handler
pub fn dispatch(inv: &Invocation<'_>, desc: &ResourceDescriptor) -> Outcome {
    let method: Method = desc.method.parse()?;
    info!(
        "Applying {} resource '{}'{}",
        method,
        desc.id,
        if inv.dry_run { " (dry run)" } else { "" }
    );

    match method {
        Method::Absent => absent::apply(inv, desc),
        Method::Exists => exists::exists(inv, desc),
        Method::Missing => exists::missing(inv, desc),
        Method::Touch => touch::apply(inv, desc),
        Method::Symlink => symlink::apply(inv, desc),
        Method::Directory => directory::apply(inv, desc),
        Method::Content => content::apply(inv, desc),
        Method::Contains => contains::contains(inv, desc),
        Method::Append => contains::append(inv, desc),
        Method::Prepend => contains::prepend(inv, desc),
        Method::Cached => cached::apply(inv, desc),
        Method::Managed => managed::apply(inv, desc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentConfig;
    use tempfile::TempDir;

    #[test]
    fn test_nesting_limits() {
        let cache = TempDir::new().unwrap();
        let engine = Engine::new(AgentConfig::with_cache_dir(cache.path())).unwrap();
        let cached = ResourceDescriptor::new("c", "cached")
            .with("source", "/etc/hostname")
            .with("skip_verify", true);

        let deepest = Invocation {
            engine: &engine,
            dry_run: true,
            depth: MAX_NESTING_DEPTH,
        };
        let err = deepest.nested(&cached).unwrap_err();
        assert!(matches!(err.error, ConvergeError::NestingTooDeep(MAX_NESTING_DEPTH)));

        let root = Invocation::root(&engine, true);
        let err = root
            .nested(&ResourceDescriptor::new("x", "absent").with("name", "/tmp/x"))
            .unwrap_err();
        assert!(matches!(err.error, ConvergeError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_prepare_parent() {
        let cache = TempDir::new().unwrap();
        let engine = Engine::new(AgentConfig::with_cache_dir(cache.path())).unwrap();
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b/file");

        let mut result = ApplyResult::new();
        let err = Invocation::root(&engine, false)
            .prepare_parent(&mut result, &target, false)
            .unwrap_err();
        assert!(matches!(err, ConvergeError::PathNotFound(_)));

        let mut result = ApplyResult::new();
        Invocation::root(&engine, true)
            .prepare_parent(&mut result, &target, true)
            .unwrap();
        assert!(!dir.path().join("a").exists());
        assert!(result.notes[0].as_str().starts_with("would create parent directory"));

        let mut result = ApplyResult::new();
        Invocation::root(&engine, false)
            .prepare_parent(&mut result, &target, true)
            .unwrap();
        assert!(dir.path().join("a/b").is_dir());

        let mut result = ApplyResult::new();
        Invocation::root(&engine, false)
            .prepare_parent(&mut result, &target, true)
            .unwrap();
        assert!(result.notes.is_empty());
    }

    #[test]
    fn test_method_parse() {
        for m in Method::ALL {
            assert_eq!(m.as_str().parse::<Method>().unwrap(), m);
        }
        assert_eq!(" Content ".parse::<Method>().unwrap(), Method::Content);
        assert!(matches!(
            "chmod".parse::<Method>(),
            Err(ConvergeError::UnknownMethod(_))
        ));
    }
}

//! Content-addressed cache
//!
//! One file per verified source at `<cache_dir>/<key>`, where the key is
//! the expected hash string. Existence plus a hash match is the only proof
//! of validity; there is no index.
//!
//! Writers stage into a temp file inside the cache directory and rename it
//! over the destination only after verification. Two first writers of the
//! same key may both download, but a reader never observes a partial file.

use crate::error::{ConvergeError, Result};
use crate::hashing::{split_digest, HashRegistry};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Key prefix for sources cached without an expected hash
pub const UNHASHED_PREFIX: &str = "src-";

/// Cache key for a source
///
/// The expected hash when there is one; otherwise a key derived from the
/// source URI (only reachable with `skip_verify`).
///
/// # Examples
///
/// ```
/// use converge_rs::cache::cache_key;
///
/// assert_eq!(cache_key(Some("md5:abc"), "http://x/y"), "md5:abc");
/// assert!(cache_key(None, "http://x/y").starts_with("src-"));
/// ```
pub fn cache_key(hash: Option<&str>, source: &str) -> String {
    match hash.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hash) => hash.to_string(),
        None => {
            let digest = Sha256::digest(source.as_bytes());
            format!("{}{}", UNHASHED_PREFIX, hex::encode(digest))
        }
    }
}

/// Check that a hash is usable as a cache key
///
/// Only `[algo:]hex` digests are accepted, so a key can never name a path
/// outside the cache directory.
///
/// # Examples
///
/// ```
/// use converge_rs::cache::validate_key;
///
/// assert!(validate_key("cached", "md5:5d41402abc4b2a76b9719d911017c592").is_ok());
/// assert!(validate_key("cached", "../../etc/passwd").is_err());
/// assert!(validate_key("cached", "/tmp/escaped").is_err());
/// ```
pub fn validate_key(method: &str, hash: &str) -> Result<()> {
    match split_digest(hash) {
        Some(_) => Ok(()),
        None => Err(ConvergeError::InvalidDescriptor {
            method: method.to_string(),
            reason: format!("hash '{}' is not an [algo:]hex digest", hash),
        }),
    }
}

/// Destination of a cache entry
pub fn cache_destination(cache_dir: &Path, hash: Option<&str>, source: &str) -> PathBuf {
    cache_dir.join(cache_key(hash, source))
}

/// A staged, not yet visible cache entry
pub struct StagedEntry {
    file: NamedTempFile,
    destination: PathBuf,
}

impl StagedEntry {
    /// Stage a new entry next to its destination
    pub fn create(destination: &Path) -> Result<Self> {
        let dir = destination
            .parent()
            .ok_or_else(|| ConvergeError::PathNotFound(destination.to_path_buf()))?;
        fs::create_dir_all(dir)?;
        let file = NamedTempFile::new_in(dir)?;
        Ok(StagedEntry {
            file,
            destination: destination.to_path_buf(),
        })
    }

    /// Writer for the staged bytes
    pub fn writer(&mut self) -> &mut fs::File {
        self.file.as_file_mut()
    }

    /// Verify staged bytes against the expected hash
    ///
    /// # Errors
    ///
    /// Returns `HashMismatch` if the digest differs.
    pub fn verify(&mut self, hashes: &HashRegistry, expected: &str) -> Result<()> {
        let file = self.file.as_file_mut();
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;
        let (actual, matches) = hashes.verify_reader(file, expected)?;
        if !matches {
            return Err(ConvergeError::HashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Atomically publish the entry at its destination
    pub fn commit(mut self) -> Result<PathBuf> {
        self.file.as_file_mut().sync_all()?;
        let destination = self.destination;
        self.file
            .persist(&destination)
            .map_err(|e| ConvergeError::Io(e.error))?;
        debug!("Committed cache entry {:?}", destination);
        Ok(destination)
    }
}

//! Hash verification registry
//!
//! Maps algorithm names to digest functions. Built-ins cover md5, sha1,
//! sha256, sha512 and crc32. Extensions register their own functions at
//! startup; names are never replaced or removed.
//!
//! Digest strings follow the grammar
//!
//! ```text
//! digest := [ algo ":" ] hex
//! algo   := [a-z0-9]+      (case-insensitive)
//! hex    := [0-9a-fA-F]+
//! ```
//!
//! An explicit `algo` prefix wins. Without one the hex length decides:
//! 8 → crc32, 32 → md5, 40 → sha1, 64 → sha256, 128 → sha512.

use crate::error::{ConvergeError, Result};
use md5::Md5;
use parking_lot::RwLock;
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Pattern for `[algo:]hex` digest strings
const DIGEST_PATTERN: &str = r"^(?:([A-Za-z0-9]+):)?([0-9a-fA-F]+)$";

const READ_CHUNK: usize = 64 * 1024;

fn digest_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DIGEST_PATTERN).unwrap())
}

/// Split a digest string into its optional algorithm prefix and hex part
///
/// # Examples
///
/// ```
/// use converge_rs::hashing::split_digest;
///
/// assert_eq!(split_digest("sha256:ABCD"), Some((Some("sha256".to_string()), "abcd".to_string())));
/// assert_eq!(split_digest("abcd"), Some((None, "abcd".to_string())));
/// assert_eq!(split_digest("sha256:"), None);
/// ```
pub fn split_digest(digest: &str) -> Option<(Option<String>, String)> {
    let caps = digest_regex().captures(digest.trim())?;
    let algo = caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
    let hex = caps.get(2)?.as_str().to_ascii_lowercase();
    Some((algo, hex))
}

/// Infer the hash algorithm name for a digest string
///
/// # Examples
///
/// ```
/// use converge_rs::hashing::guess_type;
///
/// assert_eq!(guess_type("d41d8cd98f00b204e9800998ecf8427e").unwrap(), "md5");
/// assert_eq!(guess_type("SHA512:00ff").unwrap(), "sha512");
/// assert!(guess_type("xyz").is_err());
/// ```
pub fn guess_type(digest: &str) -> Result<String> {
    let (algo, hex) =
        split_digest(digest).ok_or_else(|| ConvergeError::UnknownHashType(digest.to_string()))?;

    if let Some(algo) = algo {
        return Ok(algo);
    }

    let name = match hex.len() {
        8 => "crc32",
        32 => "md5",
        40 => "sha1",
        64 => "sha256",
        128 => "sha512",
        _ => return Err(ConvergeError::UnknownHashType(digest.to_string())),
    };
    Ok(name.to_string())
}

/// A digest-compare capability
///
/// `digest` streams the reader and returns the lowercase hex digest;
/// `check` compares it against an expected digest (prefix and case ignored).
pub trait HashFunc: Send + Sync {
    fn digest(&self, reader: &mut dyn Read) -> io::Result<String>;

    fn check(&self, reader: &mut dyn Read, expected: &str) -> Result<(String, bool)> {
        let actual = self.digest(reader)?;
        let expected_hex = split_digest(expected)
            .map(|(_, hex)| hex)
            .unwrap_or_else(|| expected.to_ascii_lowercase());
        let matches = actual == expected_hex;
        Ok((actual, matches))
    }
}

impl<F> HashFunc for F
where
    F: Fn(&mut dyn Read) -> io::Result<String> + Send + Sync,
{
    fn digest(&self, reader: &mut dyn Read) -> io::Result<String> {
        self(reader)
    }
}

/// Any RustCrypto `Digest` as a hash function
pub struct DigestHash<D> {
    _marker: std::marker::PhantomData<fn() -> D>,
}

impl<D> DigestHash<D> {
    pub fn new() -> Self {
        DigestHash {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<D> Default for DigestHash<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Digest> HashFunc for DigestHash<D> {
    fn digest(&self, reader: &mut dyn Read) -> io::Result<String> {
        let mut hasher = D::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// CRC-32 (IEEE), rendered as 8 lowercase hex characters
pub struct Crc32Hash;

impl HashFunc for Crc32Hash {
    fn digest(&self, reader: &mut dyn Read) -> io::Result<String> {
        let mut hasher = crc32fast::Hasher::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:08x}", hasher.finalize()))
    }
}

/// Name → hash function registry
///
/// The lock is held only across a lookup or a registration, never while
/// hashing.
pub struct HashRegistry {
    funcs: RwLock<HashMap<String, Arc<dyn HashFunc>>>,
}

impl HashRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        HashRegistry {
            funcs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding md5, sha1, sha256, sha512 and crc32
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        {
            let mut funcs = registry.funcs.write();
            funcs.insert("md5".into(), Arc::new(DigestHash::<Md5>::new()));
            funcs.insert("sha1".into(), Arc::new(DigestHash::<Sha1>::new()));
            funcs.insert("sha256".into(), Arc::new(DigestHash::<Sha256>::new()));
            funcs.insert("sha512".into(), Arc::new(DigestHash::<Sha512>::new()));
            funcs.insert("crc32".into(), Arc::new(Crc32Hash));
        }
        registry
    }

    /// Register a hash function under a name
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if the name is taken; the existing
    /// function stays in place.
    pub fn register(&self, name: &str, func: Arc<dyn HashFunc>) -> Result<()> {
        let name = name.to_ascii_lowercase();
        let mut funcs = self.funcs.write();
        if funcs.contains_key(&name) {
            return Err(ConvergeError::AlreadyRegistered(name));
        }
        debug!("Registered hash function '{}'", name);
        funcs.insert(name, func);
        Ok(())
    }

    /// Look up a hash function by name
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn HashFunc>> {
        self.funcs
            .read()
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ConvergeError::HashNotFound(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.funcs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Hash a stream with the algorithm implied by `expected` and compare
    pub fn verify_reader(&self, reader: &mut dyn Read, expected: &str) -> Result<(String, bool)> {
        let algo = guess_type(expected)?;
        let func = self.lookup(&algo)?;
        func.check(reader, expected)
    }

    /// Hash a file with the algorithm implied by `expected` and compare
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` when the file does not exist.
    pub fn verify_file(&self, path: &Path, expected: &str) -> Result<(String, bool)> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ConvergeError::FileNotFound(path.to_path_buf())
            } else {
                ConvergeError::Io(e)
            }
        })?;
        let mut reader = BufReader::new(file);
        self.verify_reader(&mut reader, expected)
    }
}

impl Default for HashRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

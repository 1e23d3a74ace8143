//! Error types for resource convergence

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvergeError {
    #[error("Missing name: resource '{0}' has no target path")]
    MissingName(String),

    #[error("Missing target: resource '{0}' has no link target")]
    MissingTarget(String),

    #[error("Missing source: resource '{0}' has no source")]
    MissingSource(String),

    #[error("Missing hash: resource '{0}' needs a hash for every source unless skip_verify is set")]
    MissingHash(String),

    #[error("Invalid descriptor for method '{method}': {reason}")]
    InvalidDescriptor { method: String, reason: String },

    #[error("Refusing to modify the root directory")]
    ModifyRoot,

    #[error("Refusing to delete the root directory")]
    DeleteRoot,

    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Path already exists: {}", .0.display())]
    PathExists(PathBuf),

    #[error("Cache failure in sub-resource '{resource}': {source}")]
    CacheFailure {
        resource: String,
        #[source]
        source: Box<ConvergeError>,
    },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Cannot infer hash type from '{0}'")]
    UnknownHashType(String),

    #[error("Hash function not found: {0}")]
    HashNotFound(String),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Unknown protocol for source '{0}'")]
    UnknownProtocol(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Protocol already registered: {0}")]
    DuplicateProtocol(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Missing content: {} does not contain the desired lines", .0.display())]
    MissingContent(PathBuf),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("Invalid mode '{0}' (expected an octal string such as 0755)")]
    InvalidMode(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Download of '{source_uri}' failed: {reason}")]
    Download { source_uri: String, reason: String },

    #[error("Sub-resource nesting exceeded depth {0}")]
    NestingTooDeep(usize),

    #[error("Delegation to agent '{agent}' timed out after {secs}s")]
    DelegationTimeout { agent: String, secs: u64 },

    #[error("Delegation channel to agent '{0}' closed before a result arrived")]
    DelegationClosed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConvergeError {
    /// Wrap a failed nested sub-resource error
    pub fn cache_failure(resource: impl Into<String>, source: ConvergeError) -> Self {
        ConvergeError::CacheFailure {
            resource: resource.into(),
            source: Box::new(source),
        }
    }

    /// True for the "not yet cached" verify outcome
    pub fn is_not_found(&self) -> bool {
        match self {
            ConvergeError::FileNotFound(_) => true,
            ConvergeError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvergeError>;

//! Typed parameter records, one per method
//!
//! The dynamic parameter map of a descriptor is deserialized once at entry.
//! Any type error becomes a single `InvalidDescriptor`; required-field
//! checks happen afterwards in the handler so they map to the specific
//! `MissingName` / `MissingSource` / ... kinds.

use crate::error::{ConvergeError, Result};
use crate::resource::{Params, ResourceDescriptor};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Deserialize the descriptor's params into a method record
pub fn parse<T: DeserializeOwned>(desc: &ResourceDescriptor) -> Result<T> {
    serde_json::from_value(Value::Object(desc.params.clone())).map_err(|e| {
        ConvergeError::InvalidDescriptor {
            method: desc.method.clone(),
            reason: e.to_string(),
        }
    })
}

fn default_true() -> bool {
    true
}

/// Inline text: a single string or a list of anything
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextParam {
    One(String),
    Many(Vec<Value>),
}

impl TextParam {
    /// Every element stringified, each terminated by a newline
    pub fn render(&self) -> String {
        let elements: Vec<String> = match self {
            TextParam::One(s) => vec![s.clone()],
            TextParam::Many(values) => values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        };

        let mut out = String::new();
        for element in elements {
            out.push_str(&element);
            if !element.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

/// `absent`, `exists`, `missing`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathParams {
    pub name: Option<String>,
}

/// `touch`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TouchParams {
    pub name: Option<String>,
    pub atime: Option<String>,
    pub mtime: Option<String>,
    #[serde(default)]
    pub makedirs: bool,
}

/// `symlink`
///
/// `force`, `backup`, `user`, `group`, `mode` and `recurse` are accepted
/// but have no effect yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SymlinkParams {
    pub name: Option<String>,
    pub target: Option<String>,
    #[serde(default)]
    pub makedirs: bool,
    #[serde(default)]
    pub force: bool,
    pub backup: Option<Value>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub mode: Option<String>,
    #[serde(default)]
    pub recurse: bool,
}

/// `directory`
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryParams {
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub makedirs: bool,
    pub user: Option<String>,
    pub group: Option<String>,
    pub dir_mode: Option<String>,
    pub file_mode: Option<String>,
    #[serde(default)]
    pub recurse: bool,
}

/// Inputs of the content resolution pipeline
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceParams {
    pub text: Option<TextParam>,
    pub source: Option<String>,
    pub source_hash: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub source_hashes: Vec<String>,
    #[serde(default)]
    pub skip_verify: bool,
}

/// `content`, `contains`, `append`, `prepend`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentParams {
    pub name: Option<String>,
    #[serde(default)]
    pub makedirs: bool,
    #[serde(flatten)]
    pub sources: SourceParams,
}

/// `cached`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CachedParams {
    pub source: Option<String>,
    pub hash: Option<String>,
    #[serde(default)]
    pub skip_verify: bool,
}

impl CachedParams {
    /// Params map for a derived `cached` sub-resource
    pub fn to_params(source: &str, hash: Option<&str>, skip_verify: bool) -> Params {
        let mut params = Params::new();
        params.insert("source".into(), Value::from(source));
        if let Some(hash) = hash {
            params.insert("hash".into(), Value::from(hash));
        }
        params.insert("skip_verify".into(), Value::from(skip_verify));
        params
    }
}

/// `backup` on `managed`: a flag or an explicit suffix
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BackupParam {
    Flag(bool),
    Suffix(String),
}

impl BackupParam {
    /// Backup file suffix, or `None` when backups are off
    pub fn suffix(&self) -> Option<String> {
        match self {
            BackupParam::Flag(true) => Some("bak".to_string()),
            BackupParam::Flag(false) => None,
            BackupParam::Suffix(s) if s.trim().is_empty() => None,
            BackupParam::Suffix(s) => Some(s.trim().trim_start_matches('.').to_string()),
        }
    }
}

/// `managed`
#[derive(Debug, Clone, Deserialize)]
pub struct ManagedParams {
    pub name: Option<String>,
    pub source: Option<String>,
    pub source_hash: Option<String>,
    #[serde(default)]
    pub skip_verify: bool,
    pub backup: Option<BackupParam>,
    #[serde(default)]
    pub makedirs: bool,
    pub mode: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    #[serde(default = "default_true")]
    pub create: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desc(method: &str, params: Value) -> ResourceDescriptor {
        let mut d = ResourceDescriptor::new("r", method);
        if let Value::Object(map) = params {
            d.params = map;
        }
        d
    }

    #[test]
    fn test_text_render() {
        let one: TextParam = serde_json::from_value(json!("a")).unwrap();
        assert_eq!(one.render(), "a\n");

        let many: TextParam = serde_json::from_value(json!(["a", 1, true, "b\n"])).unwrap();
        assert_eq!(many.render(), "a\n1\ntrue\nb\n");
    }

    #[test]
    fn test_content_params_flatten() {
        let params: ContentParams = parse(&desc(
            "content",
            json!({"name": "/tmp/x", "sources": ["a", "b"], "source_hashes": ["h1"], "skip_verify": false}),
        ))
        .unwrap();
        assert_eq!(params.name.as_deref(), Some("/tmp/x"));
        assert_eq!(params.sources.sources.len(), 2);
        assert_eq!(params.sources.source_hashes, vec!["h1"]);
    }

    #[test]
    fn test_type_error_is_invalid_descriptor() {
        let err = parse::<TouchParams>(&desc("touch", json!({"makedirs": "yes"}))).unwrap_err();
        assert!(matches!(err, ConvergeError::InvalidDescriptor { ref method, .. } if method == "touch"));
    }

    #[test]
    fn test_directory_defaults() {
        let params: DirectoryParams = parse(&desc("directory", json!({"name": "/d"}))).unwrap();
        assert!(params.makedirs);
        assert!(!params.recurse);
    }

    #[test]
    fn test_backup_suffix() {
        assert_eq!(BackupParam::Flag(true).suffix().as_deref(), Some("bak"));
        assert_eq!(BackupParam::Flag(false).suffix(), None);
        assert_eq!(BackupParam::Suffix(".orig".into()).suffix().as_deref(), Some("orig"));
    }
}

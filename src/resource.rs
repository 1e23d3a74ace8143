//! Resource descriptors and the uniform result contract
//!
//! Every handler receives a [`ResourceDescriptor`] and returns an [`Outcome`]:
//! either an [`ApplyResult`] that succeeded (or a reported, non-fatal failure
//! such as `missing` finding the path), or a [`Failure`] carrying both the
//! failed result, with its notes, and the typed error that caused it.

use crate::error::ConvergeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Parameter map of a resource: string key to dynamically typed value
pub type Params = Map<String, Value>;

/// A declared unit of desired filesystem state plus its convergence method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Identifier, also used to name derived sub-resources (e.g. "<id>-source")
    pub id: String,

    /// Convergence method ("absent", "content", "cached", ...)
    pub method: String,

    /// Method parameters
    #[serde(default)]
    pub params: Params,
}

impl ResourceDescriptor {
    /// Create a descriptor with no parameters
    pub fn new(id: impl Into<String>, method: impl Into<String>) -> Self {
        ResourceDescriptor {
            id: id.into(),
            method: method.into(),
            params: Params::new(),
        }
    }

    /// Builder-style parameter insertion
    ///
    /// # Examples
    ///
    /// ```
    /// use converge_rs::ResourceDescriptor;
    ///
    /// let desc = ResourceDescriptor::new("motd", "content")
    ///     .with("name", "/etc/motd")
    ///     .with("text", "welcome");
    /// assert_eq!(desc.params["name"], "/etc/motd");
    /// ```
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Derive a new descriptor for a nested sub-resource
    ///
    /// The parent is left untouched.
    pub fn derive(&self, id: impl Into<String>, method: impl Into<String>, params: Params) -> Self {
        ResourceDescriptor {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// An explanatory note attached to a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Note(String);

impl Note {
    pub fn new(text: impl Into<String>) -> Self {
        Note(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Note {
    fn from(text: String) -> Self {
        Note(text)
    }
}

impl From<&str> for Note {
    fn from(text: &str) -> Self {
        Note(text.to_string())
    }
}

/// Succeeded/Failed/Changed signal plus ordered notes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub succeeded: bool,
    pub failed: bool,
    pub changed: bool,
    pub notes: Vec<Note>,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a note
    pub fn note(&mut self, text: impl Into<Note>) {
        self.notes.push(text.into());
    }

    /// Append all notes of a nested result, preserving order
    pub fn absorb_notes(&mut self, other: &ApplyResult) {
        self.notes.extend(other.notes.iter().cloned());
    }

    /// Mark a mutation as performed (or predicted under dry-run)
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Finish as a success
    pub fn succeed(mut self) -> Outcome {
        self.succeeded = true;
        self.failed = false;
        Ok(self)
    }

    /// Finish as a reported failure that is not an error
    ///
    /// Used by the read-only assertions (`exists`, `missing`).
    pub fn report_failure(mut self) -> Outcome {
        self.succeeded = false;
        self.failed = true;
        Ok(self)
    }

    /// Finish as a failure carrying an error
    pub fn fail(mut self, error: ConvergeError) -> Outcome {
        self.succeeded = false;
        self.failed = true;
        Err(Failure {
            result: self,
            error,
        })
    }

    /// Render notes as lines, in execution order
    pub fn render_notes(&self) -> String {
        self.notes
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A failed application: the failed result and the error behind it
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct Failure {
    pub result: ApplyResult,
    #[source]
    pub error: ConvergeError,
}

impl Failure {
    /// Failure with no notes, for errors raised before any work happened
    pub fn bare(error: ConvergeError) -> Self {
        Failure {
            result: ApplyResult {
                failed: true,
                ..ApplyResult::default()
            },
            error,
        }
    }
}

impl From<ConvergeError> for Failure {
    fn from(error: ConvergeError) -> Self {
        Failure::bare(error)
    }
}

/// Result of applying one resource
pub type Outcome = std::result::Result<ApplyResult, Failure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeed_sets_exactly_one_flag() {
        let result = ApplyResult::new().succeed().unwrap();
        assert!(result.succeeded);
        assert!(!result.failed);
        assert!(!result.changed);
    }

    #[test]
    fn test_fail_keeps_notes() {
        let mut result = ApplyResult::new();
        result.note("first");
        result.note(format!("second {}", 2));
        let failure = result.fail(ConvergeError::ModifyRoot).unwrap_err();
        assert!(failure.result.failed);
        assert!(!failure.result.succeeded);
        assert_eq!(failure.result.render_notes(), "first\nsecond 2");
        assert!(matches!(failure.error, ConvergeError::ModifyRoot));
    }

    #[test]
    fn test_derive_leaves_parent_untouched() {
        let parent = ResourceDescriptor::new("motd", "content").with("name", "/etc/motd");
        let mut params = Params::new();
        params.insert("source".into(), "/tmp/a".into());
        let child = parent.derive("motd-source", "cached", params);
        assert_eq!(child.id, "motd-source");
        assert_eq!(parent.params.len(), 1);
        assert!(!parent.params.contains_key("source"));
    }

    #[test]
    fn test_descriptor_json_round_trip_defaults_params() {
        let desc: ResourceDescriptor =
            serde_json::from_str(r#"{"id":"x","method":"exists"}"#).unwrap();
        assert!(desc.params.is_empty());
    }
}

//! Validation for resource target paths and modes
//!
//! Target names are cleaned lexically before any check runs, so `"/tmp/.."`
//! and `"//"` are both treated as the root directory and refused.

use crate::error::{ConvergeError, Result};
use std::path::{Component, Path, PathBuf};

/// Lexically clean a path
///
/// Collapses repeated separators and `.` components and resolves `..`
/// against preceding components. `..` at the root stays at the root.
/// The filesystem is never consulted.
///
/// # Examples
///
/// ```
/// use converge_rs::validation::clean_path;
/// use std::path::Path;
///
/// assert_eq!(clean_path("/etc//motd"), Path::new("/etc/motd"));
/// assert_eq!(clean_path("/tmp/../"), Path::new("/"));
/// assert_eq!(clean_path("a/./b/../c"), Path::new("a/c"));
/// ```
pub fn clean_path(path: impl AsRef<Path>) -> PathBuf {
    let mut cleaned = PathBuf::new();
    // Number of normal components that `..` may still pop
    let mut depth = 0usize;

    for component in path.as_ref().components() {
        match component {
            Component::Prefix(p) => cleaned.push(p.as_os_str()),
            Component::RootDir => cleaned.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    cleaned.pop();
                    depth -= 1;
                } else if !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            Component::Normal(part) => {
                cleaned.push(part);
                depth += 1;
            }
        }
    }

    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// True if the cleaned path is the filesystem root
pub fn is_root(path: &Path) -> bool {
    clean_path(path) == Path::new("/")
}

/// Require a non-empty `name` parameter and return it cleaned
///
/// # Errors
///
/// Returns `MissingName` for an absent or blank name.
pub fn require_name(id: &str, name: Option<&str>) -> Result<PathBuf> {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(clean_path(name)),
        _ => Err(ConvergeError::MissingName(id.to_string())),
    }
}

/// Refuse to modify the root directory
pub fn guard_modify(path: &Path) -> Result<()> {
    if is_root(path) {
        return Err(ConvergeError::ModifyRoot);
    }
    Ok(())
}

/// Refuse to delete the root directory
pub fn guard_delete(path: &Path) -> Result<()> {
    if is_root(path) {
        return Err(ConvergeError::DeleteRoot);
    }
    Ok(())
}

/// Parse an octal permission string such as `"0755"` or `"644"`
///
/// # Examples
///
/// ```
/// use converge_rs::validation::parse_mode;
///
/// assert_eq!(parse_mode("0755").unwrap(), 0o755);
/// assert_eq!(parse_mode("0o600").unwrap(), 0o600);
/// assert!(parse_mode("rwx").is_err());
/// ```
pub fn parse_mode(mode: &str) -> Result<u32> {
    let trimmed = mode.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);

    if digits.is_empty() || digits.len() > 5 {
        return Err(ConvergeError::InvalidMode(mode.to_string()));
    }

    let value =
        u32::from_str_radix(digits, 8).map_err(|_| ConvergeError::InvalidMode(mode.to_string()))?;
    if value > 0o7777 {
        return Err(ConvergeError::InvalidMode(mode.to_string()));
    }
    Ok(value)
}

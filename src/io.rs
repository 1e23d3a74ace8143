//! Disk I/O helpers shared by the handlers

use crate::error::{ConvergeError, Result};
use nix::unistd::{Group, User};
use std::fs::{self, Metadata, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Mode given to files created from scratch
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Metadata without following a final symlink; `None` if nothing is there
pub fn lstat(path: &Path) -> Result<Option<Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read a whole file; `None` if it does not exist
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The parent directory of `path` if it does not exist yet
pub fn missing_parent(path: &Path) -> Option<PathBuf> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            Some(parent.to_path_buf())
        }
        _ => None,
    }
}

/// Replace a file's content atomically
///
/// Bytes are staged in the target directory and renamed over the target.
/// An existing file keeps its permissions unless `mode` is given.
pub fn atomic_write(path: &Path, content: &[u8], mode: Option<u32>) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let permissions = match (mode, lstat(path)?) {
        (Some(mode), _) => Permissions::from_mode(mode),
        (None, Some(meta)) => meta.permissions(),
        (None, None) => Permissions::from_mode(DEFAULT_FILE_MODE),
    };

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(content)?;
    staged.as_file().sync_all()?;
    staged.as_file().set_permissions(permissions)?;
    staged
        .persist(path)
        .map_err(|e| ConvergeError::Io(e.error))?;
    Ok(())
}

/// Visit `root` and everything below it down to `max_depth` levels
///
/// Depth 0 visits only `root`. Symlinks are visited but never followed.
pub fn walk(
    root: &Path,
    max_depth: usize,
    visit: &mut dyn FnMut(&Path, &Metadata) -> Result<()>,
) -> Result<()> {
    let meta = fs::symlink_metadata(root)?;
    visit(root, &meta)?;
    if max_depth > 0 && meta.is_dir() {
        let mut entries = fs::read_dir(root)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        for entry in entries {
            walk(&entry, max_depth - 1, visit)?;
        }
    }
    Ok(())
}

/// Resolve a user name (or numeric uid) to a uid
pub fn resolve_uid(user: &str) -> Result<u32> {
    if let Ok(uid) = user.parse::<u32>() {
        return Ok(uid);
    }
    match User::from_name(user) {
        Ok(Some(u)) => Ok(u.uid.as_raw()),
        Ok(None) => Err(ConvergeError::UnknownUser(user.to_string())),
        Err(e) => Err(ConvergeError::Io(io::Error::from(e))),
    }
}

/// Resolve a group name (or numeric gid) to a gid
pub fn resolve_gid(group: &str) -> Result<u32> {
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(gid);
    }
    match Group::from_name(group) {
        Ok(Some(g)) => Ok(g.gid.as_raw()),
        Ok(None) => Err(ConvergeError::UnknownGroup(group.to_string())),
        Err(e) => Err(ConvergeError::Io(io::Error::from(e))),
    }
}

/// Permission bits of an entry (no file type bits)
pub fn mode_bits(meta: &Metadata) -> u32 {
    meta.mode() & 0o7777
}

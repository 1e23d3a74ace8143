//! Integration tests for the filesystem handlers

use converge_rs::{AgentConfig, ConvergeError, Engine, ResourceDescriptor};
use serde_json::json;
use std::fs::{self, Permissions};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Helper to create an engine whose cache lives in its own temp dir
fn create_engine() -> (Engine, TempDir) {
    let cache = TempDir::new().unwrap();
    let engine = Engine::new(AgentConfig::with_cache_dir(cache.path())).unwrap();
    (engine, cache)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn mode_of(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[test]
fn test_absent_is_idempotent() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("doomed");
    fs::write(&target, b"bye").unwrap();

    let desc = ResourceDescriptor::new("doomed", "absent").with("name", path_str(&target));

    let first = engine.apply(&desc, false).unwrap();
    assert!(first.succeeded);
    assert!(first.changed);
    assert!(!target.exists());

    let second = engine.apply(&desc, false).unwrap();
    assert!(second.succeeded);
    assert!(!second.changed);
    assert!(second.notes[0].as_str().contains("already absent"));
}

#[test]
fn test_absent_dry_run_keeps_file() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("kept");
    fs::write(&target, b"still here").unwrap();

    let desc = ResourceDescriptor::new("kept", "absent").with("name", path_str(&target));
    let result = engine.apply(&desc, true).unwrap();

    assert!(result.succeeded);
    assert!(result.changed);
    assert_eq!(fs::read(&target).unwrap(), b"still here");
}

#[test]
fn test_absent_removes_dangling_symlink() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let link = dir.path().join("dangling");
    symlink(dir.path().join("nowhere"), &link).unwrap();

    let desc = ResourceDescriptor::new("dangling", "absent").with("name", path_str(&link));
    let result = engine.apply(&desc, false).unwrap();

    assert!(result.changed);
    assert!(fs::symlink_metadata(&link).is_err());
}

#[test]
fn test_missing_name() {
    let (engine, _cache) = create_engine();
    let err = engine
        .apply(&ResourceDescriptor::new("nameless", "absent"), false)
        .unwrap_err();
    assert!(matches!(err.error, ConvergeError::MissingName(ref id) if id == "nameless"));
    assert!(err.result.failed);
}

#[test]
fn test_exists_and_missing() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let present = dir.path().join("present");
    fs::write(&present, b"").unwrap();
    let gone = dir.path().join("gone");

    let exists = |p: &Path| ResourceDescriptor::new("e", "exists").with("name", path_str(p));
    let missing = |p: &Path| ResourceDescriptor::new("m", "missing").with("name", path_str(p));

    let result = engine.apply(&exists(&present), false).unwrap();
    assert!(result.succeeded && !result.changed);

    let result = engine.apply(&exists(&gone), false).unwrap();
    assert!(result.failed && !result.succeeded);

    let result = engine.apply(&missing(&gone), false).unwrap();
    assert!(result.succeeded);

    let result = engine.apply(&missing(&present), true).unwrap();
    assert!(result.failed);
    assert!(!result.changed);
}

#[test]
fn test_touch_creates_then_sets_times() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("sub/stamp");

    let desc = ResourceDescriptor::new("stamp", "touch")
        .with("name", path_str(&target))
        .with("mtime", "2001-02-03T04:05:06Z")
        .with("atime", "2001-02-03T04:05:06Z");

    let err = engine.apply(&desc, false).unwrap_err();
    assert!(matches!(err.error, ConvergeError::PathNotFound(_)));

    let desc = desc.with("makedirs", true);
    let dry = engine.apply(&desc, true).unwrap();
    assert!(dry.changed);
    assert!(!target.exists());

    let result = engine.apply(&desc, false).unwrap();
    assert!(result.succeeded && result.changed);

    let expected = SystemTime::UNIX_EPOCH + Duration::from_secs(981_173_106);
    assert_eq!(fs::metadata(&target).unwrap().modified().unwrap(), expected);

    let again = engine.apply(&desc, false).unwrap();
    assert!(!again.changed);
}

#[test]
fn test_touch_invalid_timestamp() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let desc = ResourceDescriptor::new("stamp", "touch")
        .with("name", path_str(&dir.path().join("f")))
        .with("mtime", "last tuesday");

    let err = engine.apply(&desc, false).unwrap_err();
    assert!(matches!(err.error, ConvergeError::InvalidTimestamp { .. }));
    assert!(!dir.path().join("f").exists());
}

#[test]
fn test_symlink_lifecycle() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let link = dir.path().join("current");
    let target = dir.path().join("release-1");

    let desc = ResourceDescriptor::new("current", "symlink")
        .with("name", path_str(&link))
        .with("target", path_str(&target));

    let dry = engine.apply(&desc, true).unwrap();
    assert!(dry.changed);
    assert!(fs::symlink_metadata(&link).is_err());

    let result = engine.apply(&desc, false).unwrap();
    assert!(result.changed);
    assert_eq!(fs::read_link(&link).unwrap(), target);

    let again = engine.apply(&desc, false).unwrap();
    assert!(again.succeeded);
    assert!(!again.changed);

    let other = ResourceDescriptor::new("current", "symlink")
        .with("name", path_str(&link))
        .with("target", path_str(&dir.path().join("release-2")));
    let err = engine.apply(&other, false).unwrap_err();
    assert!(matches!(err.error, ConvergeError::PathExists(_)));
}

#[test]
fn test_symlink_missing_target() {
    let (engine, _cache) = create_engine();
    let desc = ResourceDescriptor::new("l", "symlink").with("name", "/tmp/converge-no-target");
    let err = engine.apply(&desc, false).unwrap_err();
    assert!(matches!(err.error, ConvergeError::MissingTarget(_)));
}

#[test]
fn test_directory_modes() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("srv/app");

    let desc = ResourceDescriptor::new("app", "directory")
        .with("name", path_str(&root))
        .with("dir_mode", "0750")
        .with("file_mode", "0600");

    let created = engine.apply(&desc, false).unwrap();
    assert!(created.changed);
    assert_eq!(mode_of(&root), 0o750);

    fs::write(root.join("config"), b"x").unwrap();
    fs::set_permissions(root.join("config"), Permissions::from_mode(0o644)).unwrap();
    fs::create_dir(root.join("nested")).unwrap();
    fs::write(root.join("nested/deep"), b"y").unwrap();
    fs::set_permissions(root.join("nested/deep"), Permissions::from_mode(0o644)).unwrap();

    let shallow = engine.apply(&desc, false).unwrap();
    assert!(shallow.changed);
    assert_eq!(mode_of(&root.join("config")), 0o600);
    assert_eq!(mode_of(&root.join("nested/deep")), 0o644);

    let recursive = desc.clone().with("recurse", true);
    let dry = engine.apply(&recursive, true).unwrap();
    assert!(dry.changed);
    assert_eq!(mode_of(&root.join("nested/deep")), 0o644);

    engine.apply(&recursive, false).unwrap();
    assert_eq!(mode_of(&root.join("nested")), 0o750);
    assert_eq!(mode_of(&root.join("nested/deep")), 0o600);

    let settled = engine.apply(&recursive, false).unwrap();
    assert!(!settled.changed);
}

#[test]
fn test_directory_over_file() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain");
    fs::write(&file, b"").unwrap();

    let desc = ResourceDescriptor::new("d", "directory").with("name", path_str(&file));
    let err = engine.apply(&desc, false).unwrap_err();
    assert!(matches!(err.error, ConvergeError::PathExists(_)));
}

#[test]
fn test_invalid_param_type() {
    let (engine, _cache) = create_engine();
    let mut desc = ResourceDescriptor::new("d", "directory");
    desc.params = json!({"name": "/tmp/x", "recurse": "sometimes"})
        .as_object()
        .cloned()
        .unwrap();

    let err = engine.apply(&desc, false).unwrap_err();
    assert!(matches!(
        err.error,
        ConvergeError::InvalidDescriptor { ref method, .. } if method == "directory"
    ));
}

fn times_of(path: &Path) -> (SystemTime, SystemTime) {
    let meta = fs::metadata(path).unwrap();
    (meta.accessed().unwrap(), meta.modified().unwrap())
}

fn set_times(path: &Path, atime: SystemTime, mtime: SystemTime) {
    let times = fs::FileTimes::new().set_accessed(atime).set_modified(mtime);
    fs::File::open(path).unwrap().set_times(times).unwrap();
}

#[test]
fn test_directory_dry_run_creates_nothing() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("srv/app");

    let desc = ResourceDescriptor::new("app", "directory")
        .with("name", path_str(&root))
        .with("dir_mode", "0750");

    let dry = engine.apply(&desc, true).unwrap();
    assert!(dry.succeeded && dry.changed);
    assert!(!dir.path().join("srv").exists());

    let strict = desc.clone().with("makedirs", false);
    let err = engine.apply(&strict, true).unwrap_err();
    assert!(matches!(err.error, ConvergeError::PathNotFound(_)));
    assert!(!dir.path().join("srv").exists());
}

#[test]
fn test_touch_dry_run_keeps_times() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("stamp");
    fs::write(&target, b"").unwrap();
    let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
    set_times(&target, old, old);

    let desc = ResourceDescriptor::new("stamp", "touch").with("name", path_str(&target));
    let dry = engine.apply(&desc, true).unwrap();
    assert!(dry.succeeded && dry.changed);
    assert_eq!(times_of(&target), (old, old));

    let result = engine.apply(&desc, false).unwrap();
    assert!(result.changed);
    assert!(times_of(&target).1 > old);
}

#[test]
fn test_touch_reports_which_times_changed() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("stamp");
    fs::write(&target, b"").unwrap();
    let early = "2001-02-03T04:05:06Z";
    let late = "2011-02-03T04:05:06Z";
    let early_time = SystemTime::UNIX_EPOCH + Duration::from_secs(981_173_106);
    set_times(&target, early_time, early_time);

    let touch = |atime: &str, mtime: &str| {
        ResourceDescriptor::new("stamp", "touch")
            .with("name", path_str(&target))
            .with("atime", atime)
            .with("mtime", mtime)
    };
    let first_note = |desc: &ResourceDescriptor| {
        let result = engine.apply(desc, false).unwrap();
        result.notes[0].as_str().to_string()
    };

    assert!(first_note(&touch(early, early)).ends_with("timestamps are already current"));
    assert!(first_note(&touch(late, early)).starts_with("atime of "));
    assert!(first_note(&touch(late, late)).starts_with("mtime of "));
    assert!(first_note(&touch(early, early)).starts_with("atime and mtime of "));
    assert_eq!(times_of(&target), (early_time, early_time));
}

#[test]
fn test_touch_single_time_settles() {
    let (engine, _cache) = create_engine();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("stamp");
    fs::write(&target, b"").unwrap();
    let atime_before = times_of(&target).0;

    let desc = ResourceDescriptor::new("stamp", "touch")
        .with("name", path_str(&target))
        .with("mtime", "2001-02-03T04:05:06Z");

    let first = engine.apply(&desc, false).unwrap();
    assert!(first.changed);
    let (atime, mtime) = times_of(&target);
    assert_eq!(atime, atime_before);
    assert_eq!(mtime, SystemTime::UNIX_EPOCH + Duration::from_secs(981_173_106));

    let second = engine.apply(&desc, false).unwrap();
    assert!(second.succeeded);
    assert!(!second.changed);
}

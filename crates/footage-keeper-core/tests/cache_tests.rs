use std::fs;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use tempfile::tempdir;

use footage_keeper_core::cache::{FolderSizeCache, SizeSource};

const ARTIFACT: &str = "folder_size.json";

#[test]
fn test_second_lookup_is_served_from_cache() {
    let tmp = tempdir().unwrap();
    let folder = tmp.path();
    fs::write(folder.join("a.mp4"), vec![0u8; 1_000]).unwrap();
    fs::write(folder.join("a.mp4_boxed.jpg"), vec![0u8; 24]).unwrap();

    let cache = FolderSizeCache::new(ARTIFACT);
    let first = cache.get_size(folder).unwrap();
    assert_eq!(first.source, SizeSource::Computed);
    assert_eq!(first.size_bytes, 1_024);
    assert!(folder.join(ARTIFACT).exists());

    let second = cache.get_size(folder).unwrap();
    assert_eq!(second.source, SizeSource::Cached);
    assert_eq!(second.size_bytes, 1_024);
}

#[test]
fn test_artifact_is_not_counted() {
    let tmp = tempdir().unwrap();
    let folder = tmp.path();
    fs::write(folder.join("a.mp4"), vec![0u8; 500]).unwrap();

    let cache = FolderSizeCache::new(ARTIFACT);
    cache.get_size(folder).unwrap();
    cache.invalidate(folder).unwrap();
    fs::write(folder.join(ARTIFACT), vec![b' '; 4_096]).unwrap();

    let lookup = cache.get_size(folder).unwrap();
    assert_eq!(lookup.source, SizeSource::Computed);
    assert_eq!(lookup.size_bytes, 500);
}

#[test]
fn test_new_file_forces_recompute() {
    let tmp = tempdir().unwrap();
    let folder = tmp.path();
    fs::write(folder.join("a.mp4"), vec![0u8; 100]).unwrap();

    let cache = FolderSizeCache::new(ARTIFACT);
    assert_eq!(cache.get_size(folder).unwrap().size_bytes, 100);

    fs::write(folder.join("b.mp4"), vec![0u8; 50]).unwrap();
    let lookup = cache.get_size(folder).unwrap();
    assert_eq!(lookup.source, SizeSource::Computed);
    assert_eq!(lookup.size_bytes, 150);
}

#[test]
fn test_later_folder_mtime_invalidates_entry() {
    let tmp = tempdir().unwrap();
    let folder = tmp.path();
    fs::write(folder.join("a.mp4"), vec![0u8; 100]).unwrap();

    let cache = FolderSizeCache::new(ARTIFACT);
    cache.get_size(folder).unwrap();

    let future = SystemTime::now() + Duration::from_secs(3_600);
    filetime::set_file_mtime(folder, FileTime::from_system_time(future)).unwrap();

    let stale = cache.get_size(folder).unwrap();
    assert_eq!(stale.source, SizeSource::Computed);
    assert_eq!(stale.size_bytes, 100);

    // The rewritten entry carries the folder mtime, so it is trusted again.
    let fresh = cache.get_size(folder).unwrap();
    assert_eq!(fresh.source, SizeSource::Cached);
}

#[test]
fn test_corrupt_artifact_is_recomputed() {
    let tmp = tempdir().unwrap();
    let folder = tmp.path();
    fs::write(folder.join("a.mp4"), vec![0u8; 64]).unwrap();
    fs::write(folder.join(ARTIFACT), "{ not json").unwrap();

    let cache = FolderSizeCache::new(ARTIFACT);
    assert!(cache.load(folder).is_none());

    let lookup = cache.get_size(folder).unwrap();
    assert_eq!(lookup.source, SizeSource::Computed);
    assert_eq!(lookup.size_bytes, 64);
    assert!(cache.load(folder).is_some());
}

#[test]
fn test_nested_directories_are_counted() {
    let tmp = tempdir().unwrap();
    let folder = tmp.path();
    fs::create_dir_all(folder.join("cam2")).unwrap();
    fs::write(folder.join("a.mp4"), vec![0u8; 10]).unwrap();
    fs::write(folder.join("cam2").join("b.mp4"), vec![0u8; 30]).unwrap();

    let cache = FolderSizeCache::new(ARTIFACT);
    assert_eq!(cache.get_size(folder).unwrap().size_bytes, 40);
}

#[test]
fn test_invalidate_then_recompute_after_deletion() {
    let tmp = tempdir().unwrap();
    let folder = tmp.path();
    fs::write(folder.join("a.mp4"), vec![0u8; 70]).unwrap();
    fs::write(folder.join("b.mp4"), vec![0u8; 30]).unwrap();

    let cache = FolderSizeCache::new(ARTIFACT);
    assert_eq!(cache.get_size(folder).unwrap().size_bytes, 100);

    fs::remove_file(folder.join("a.mp4")).unwrap();
    assert!(cache.invalidate(folder).unwrap());
    assert!(!folder.join(ARTIFACT).exists());

    let lookup = cache.get_size(folder).unwrap();
    assert_eq!(lookup.source, SizeSource::Computed);
    assert_eq!(lookup.size_bytes, 30);
}

#[test]
fn test_clear_all_counts_removed_artifacts() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("a");
    let b = tmp.path().join("b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    fs::write(a.join("x.mp4"), "x").unwrap();

    let cache = FolderSizeCache::new(ARTIFACT);
    cache.get_size(&a).unwrap();

    let removed = cache.clear_all([a.as_path(), b.as_path()]).unwrap();
    assert_eq!(removed, 1);
}

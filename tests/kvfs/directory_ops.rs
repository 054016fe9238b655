use mosaicfs::fs::{dispatch, file, walk_dir, FileMode, WalkAction};
use mosaicfs::ErrorKind;

use crate::common;

#[tokio::test]
async fn test_mkdir_all_and_list() {
    let fs = common::new_fs().await;
    dispatch::mkdir_all(&fs, "a/b/c", common::perm(0o755)).await.unwrap();

    let top = dispatch::read_dir(&fs, ".").await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].name(), "a");
    assert!(top[0].is_dir());

    let inner = dispatch::read_dir(&fs, "a/b").await.unwrap();
    assert_eq!(inner.len(), 1);
    assert_eq!(inner[0].name(), "c");
    assert!(inner[0].is_dir());

    let info = dispatch::stat(&fs, "a/b/c").await.unwrap();
    assert_eq!(info.mode & FileMode::PERM_MASK, common::perm(0o755));
    assert!(info.is_dir());
}

#[tokio::test]
async fn test_mkdir_requires_parent() {
    let fs = common::new_fs().await;
    let err = dispatch::mkdir(&fs, "a/b", common::perm(0o755)).await.unwrap_err();
    assert!(err.is(ErrorKind::NotExist));
}

#[tokio::test]
async fn test_mkdir_existing_fails() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();
    let err = dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap_err();
    assert!(err.is(ErrorKind::Exist));

    let err = dispatch::mkdir(&fs, ".", common::perm(0o755)).await.unwrap_err();
    assert!(err.is(ErrorKind::Exist));
}

#[tokio::test]
async fn test_mkdir_under_file_fails() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;
    let err = dispatch::mkdir(&fs, "f/child", common::perm(0o755)).await.unwrap_err();
    assert!(err.is(ErrorKind::NotDir));
}

#[tokio::test]
async fn test_mkdir_all_reports_offending_prefix() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "a", common::perm(0o755)).await.unwrap();
    common::write_file(&fs, "a/b", b"file in the way").await;

    let err = dispatch::mkdir_all(&fs, "a/b/c", common::perm(0o755)).await.unwrap_err();
    assert!(err.is(ErrorKind::NotDir));
    let wrapper = err.as_path_error().expect("path context");
    assert_eq!(wrapper.op, "mkdir");
    assert_eq!(wrapper.path, "a/b");
}

#[tokio::test]
async fn test_mkdir_all_tolerates_existing_chain() {
    let fs = common::new_fs().await;
    dispatch::mkdir_all(&fs, "a/b", common::perm(0o755)).await.unwrap();
    dispatch::mkdir_all(&fs, "a/b/c/d", common::perm(0o700)).await.unwrap();
    assert!(dispatch::stat(&fs, "a/b/c/d").await.unwrap().is_dir());

    // The whole chain again is a no-op.
    dispatch::mkdir_all(&fs, "a/b/c/d", common::perm(0o700)).await.unwrap();
}

#[tokio::test]
async fn test_read_dir_pages_with_handle_cursor() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();
    for name in ["d/one", "d/two", "d/three"] {
        common::write_file(&fs, name, b"").await;
    }

    let mut handle = dispatch::open(&fs, "d").await.unwrap();
    let first = file::read_dir(handle.as_mut(), 2).await.unwrap();
    assert_eq!(first.len(), 2);
    let second = file::read_dir(handle.as_mut(), 2).await.unwrap();
    assert_eq!(second.len(), 1);
    let empty = file::read_dir(handle.as_mut(), 2).await.unwrap();
    assert!(empty.is_empty());
    handle.close().await.unwrap();

    let mut seen: Vec<String> = first
        .iter()
        .chain(second.iter())
        .map(|entry| entry.name().to_owned())
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["one", "three", "two"]);
}

#[tokio::test]
async fn test_read_dir_entry_info() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();
    common::write_file(&fs, "d/f", b"abc").await;

    let entries = dispatch::read_dir(&fs, "d").await.unwrap();
    assert_eq!(entries.len(), 1);
    let info = entries[0].info().await.unwrap();
    assert_eq!(info.name, "f");
    assert_eq!(info.size, 3);
    assert!(!info.is_dir());
}

#[tokio::test]
async fn test_read_dir_of_file_fails() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;
    let err = dispatch::read_dir(&fs, "f").await.unwrap_err();
    assert!(err.is(ErrorKind::NotDir));
}

#[tokio::test]
async fn test_walk_visits_every_node_once() {
    let fs = common::new_fs().await;
    dispatch::mkdir_all(&fs, "a/b", common::perm(0o755)).await.unwrap();
    common::write_file(&fs, "a/b/f", b"x").await;
    common::write_file(&fs, "top", b"y").await;

    let mut visited = Vec::new();
    walk_dir(&fs, ".", &mut |node, entry, err| {
        assert!(err.is_none());
        assert!(entry.is_some());
        visited.push(node.to_owned());
        Ok(WalkAction::Continue)
    })
    .await
    .unwrap();

    visited.sort();
    assert_eq!(visited, vec![".", "a", "a/b", "a/b/f", "top"]);
}

#[tokio::test]
async fn test_walk_skip_dir_prunes_subtree() {
    let fs = common::new_fs().await;
    dispatch::mkdir_all(&fs, "skip/deep", common::perm(0o755)).await.unwrap();
    dispatch::mkdir(&fs, "keep", common::perm(0o755)).await.unwrap();

    let mut visited = Vec::new();
    walk_dir(&fs, ".", &mut |node, _entry, _err| {
        visited.push(node.to_owned());
        if node == "skip" {
            Ok(WalkAction::SkipDir)
        } else {
            Ok(WalkAction::Continue)
        }
    })
    .await
    .unwrap();

    assert!(visited.contains(&"skip".to_owned()));
    assert!(!visited.contains(&"skip/deep".to_owned()));
    assert!(visited.contains(&"keep".to_owned()));
}

#[tokio::test]
async fn test_walk_callback_error_aborts() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();

    let outcome = walk_dir(&fs, ".", &mut |_node, _entry, _err| {
        Err(mosaicfs::FsError::Kind(ErrorKind::Permission))
    })
    .await;
    assert!(outcome.unwrap_err().is(ErrorKind::Permission));
}

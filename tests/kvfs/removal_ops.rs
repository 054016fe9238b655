use mosaicfs::fs::dispatch;
use mosaicfs::ErrorKind;

use crate::common;

#[tokio::test]
async fn test_remove_file() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;
    dispatch::remove(&fs, "f").await.unwrap();
    let err = dispatch::stat(&fs, "f").await.unwrap_err();
    assert!(err.is(ErrorKind::NotExist));
}

#[tokio::test]
async fn test_remove_empty_directory() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();
    dispatch::remove(&fs, "d").await.unwrap();
    assert!(dispatch::stat(&fs, "d").await.unwrap_err().is(ErrorKind::NotExist));
}

#[tokio::test]
async fn test_remove_non_empty_directory() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();
    common::write_file(&fs, "d/x", b"child").await;

    let err = dispatch::remove(&fs, "d").await.unwrap_err();
    assert!(err.is(ErrorKind::NotEmpty));
    let wrapper = err.as_path_error().expect("path context");
    assert_eq!(wrapper.op, "remove");
    assert_eq!(wrapper.path, "d");

    // The tree is untouched.
    assert!(dispatch::stat(&fs, "d").await.unwrap().is_dir());
    assert_eq!(common::read_file(&fs, "d/x").await, b"child");
}

#[tokio::test]
async fn test_remove_missing() {
    let fs = common::new_fs().await;
    let err = dispatch::remove(&fs, "nope").await.unwrap_err();
    assert!(err.is(ErrorKind::NotExist));
}

#[tokio::test]
async fn test_remove_root_rejected() {
    let fs = common::new_fs().await;
    let err = dispatch::remove(&fs, ".").await.unwrap_err();
    assert!(err.is(ErrorKind::Invalid));
}

#[tokio::test]
async fn test_remove_all_deletes_tree() {
    let fs = common::new_fs().await;
    dispatch::mkdir_all(&fs, "d/sub", common::perm(0o755)).await.unwrap();
    common::write_file(&fs, "d/f", b"1").await;
    common::write_file(&fs, "d/sub/g", b"2").await;
    common::write_file(&fs, "other", b"3").await;

    dispatch::remove_all(&fs, "d").await.unwrap();
    assert!(dispatch::stat(&fs, "d").await.unwrap_err().is(ErrorKind::NotExist));
    assert!(dispatch::stat(&fs, "d/sub/g").await.unwrap_err().is(ErrorKind::NotExist));
    assert_eq!(common::read_file(&fs, "other").await, b"3");
}

#[tokio::test]
async fn test_remove_all_missing_is_ok() {
    let fs = common::new_fs().await;
    dispatch::remove_all(&fs, "nothing/here").await.unwrap();
}

#[tokio::test]
async fn test_remove_all_root_keeps_root() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;
    dispatch::remove_all(&fs, ".").await.unwrap();
    assert!(dispatch::stat(&fs, ".").await.unwrap().is_dir());
    assert!(dispatch::stat(&fs, "f").await.unwrap_err().is(ErrorKind::NotExist));
}

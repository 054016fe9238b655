use mosaicfs::fs::dispatch;
use mosaicfs::ErrorKind;

use crate::common;

#[tokio::test]
async fn test_rename_file() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "a", b"contents").await;

    dispatch::rename(&fs, "a", "b").await.unwrap();
    assert!(dispatch::stat(&fs, "a").await.unwrap_err().is(ErrorKind::NotExist));
    assert_eq!(common::read_file(&fs, "b").await, b"contents");
}

#[tokio::test]
async fn test_rename_same_path_is_noop() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "a", b"contents").await;
    dispatch::rename(&fs, "a", "a").await.unwrap();
    assert_eq!(common::read_file(&fs, "a").await, b"contents");
}

#[tokio::test]
async fn test_rename_missing_source() {
    let fs = common::new_fs().await;
    let err = dispatch::rename(&fs, "ghost", "b").await.unwrap_err();
    assert!(err.is(ErrorKind::NotExist));
    let wrapper = err.as_link_error().expect("link context");
    assert_eq!(wrapper.op, "rename");
    assert_eq!(wrapper.old, "ghost");
    assert_eq!(wrapper.new, "b");
}

#[tokio::test]
async fn test_rename_file_overwrites_file() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "a", b"new").await;
    common::write_file(&fs, "b", b"old").await;

    dispatch::rename(&fs, "a", "b").await.unwrap();
    assert_eq!(common::read_file(&fs, "b").await, b"new");
    assert!(dispatch::stat(&fs, "a").await.unwrap_err().is(ErrorKind::NotExist));
}

#[tokio::test]
async fn test_rename_file_onto_directory_rejected() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "a", b"x").await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();

    let err = dispatch::rename(&fs, "a", "d").await.unwrap_err();
    assert!(err.is(ErrorKind::IsDir));
}

#[tokio::test]
async fn test_rename_directory_moves_children() {
    let fs = common::new_fs().await;
    dispatch::mkdir_all(&fs, "src/nested", common::perm(0o755)).await.unwrap();
    common::write_file(&fs, "src/f", b"1").await;
    common::write_file(&fs, "src/nested/g", b"2").await;

    dispatch::rename(&fs, "src", "dst").await.unwrap();

    assert!(dispatch::stat(&fs, "src").await.unwrap_err().is(ErrorKind::NotExist));
    assert!(dispatch::stat(&fs, "src/f").await.unwrap_err().is(ErrorKind::NotExist));
    assert_eq!(common::read_file(&fs, "dst/f").await, b"1");
    assert_eq!(common::read_file(&fs, "dst/nested/g").await, b"2");
}

#[tokio::test]
async fn test_rename_directory_onto_existing_rejected() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "src", common::perm(0o755)).await.unwrap();
    dispatch::mkdir(&fs, "dst", common::perm(0o755)).await.unwrap();

    let err = dispatch::rename(&fs, "src", "dst").await.unwrap_err();
    assert!(err.is(ErrorKind::Exist));
}

#[tokio::test]
async fn test_rename_preserves_mode() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "a", b"x").await;
    dispatch::chmod(&fs, "a", common::perm(0o600)).await.unwrap();

    dispatch::rename(&fs, "a", "b").await.unwrap();
    let info = dispatch::stat(&fs, "b").await.unwrap();
    assert_eq!(info.mode & mosaicfs::FileMode::PERM_MASK, common::perm(0o600));
}

use std::time::{Duration, SystemTime};

use mosaicfs::fs::{dispatch, file, FileMode, OpenFlags};
use mosaicfs::ErrorKind;

use crate::common;

#[tokio::test]
async fn test_chmod_changes_permissions_only() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();

    dispatch::chmod(&fs, "d", common::perm(0o700)).await.unwrap();
    let info = dispatch::stat(&fs, "d").await.unwrap();
    assert!(info.is_dir(), "chmod must preserve the type bits");
    assert_eq!(info.mode & FileMode::PERM_MASK, common::perm(0o700));
}

#[tokio::test]
async fn test_chmod_applies_special_bits() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;

    dispatch::chmod(&fs, "f", common::perm(0o755) | FileMode::SETUID).await.unwrap();
    let info = dispatch::stat(&fs, "f").await.unwrap();
    assert_eq!(info.mode & FileMode::SETUID, FileMode::SETUID);
    assert_eq!(info.mode & FileMode::PERM_MASK, common::perm(0o755));
    assert!(!info.is_dir());
}

#[tokio::test]
async fn test_chmod_missing_file() {
    let fs = common::new_fs().await;
    let err = dispatch::chmod(&fs, "nope", common::perm(0o644)).await.unwrap_err();
    assert!(err.is(ErrorKind::NotExist));
}

#[tokio::test]
async fn test_chtimes_sets_modtime() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;

    let then = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    dispatch::chtimes(&fs, "f", None, Some(then)).await.unwrap();
    let info = dispatch::stat(&fs, "f").await.unwrap();
    assert_eq!(info.modtime, then);
}

#[tokio::test]
async fn test_chtimes_preserves_contents() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"contents").await;

    let then = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
    dispatch::chtimes(&fs, "f", Some(then), Some(then)).await.unwrap();
    assert_eq!(common::read_file(&fs, "f").await, b"contents");
}

#[tokio::test]
async fn test_handle_chmod_persists() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;

    let mut handle =
        dispatch::open_file(&fs, "f", OpenFlags::READ_WRITE, common::perm(0)).await.unwrap();
    file::chmod(handle.as_mut(), common::perm(0o600)).await.unwrap();
    handle.close().await.unwrap();

    let info = dispatch::stat(&fs, "f").await.unwrap();
    assert_eq!(info.mode & FileMode::PERM_MASK, common::perm(0o600));
}

#[tokio::test]
async fn test_write_touches_modtime() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;

    let then = SystemTime::UNIX_EPOCH + Duration::from_secs(7);
    dispatch::chtimes(&fs, "f", None, Some(then)).await.unwrap();

    let mut handle =
        dispatch::open_file(&fs, "f", OpenFlags::READ_WRITE, common::perm(0)).await.unwrap();
    file::write(handle.as_mut(), b"more").await.unwrap();
    handle.close().await.unwrap();

    let info = dispatch::stat(&fs, "f").await.unwrap();
    assert!(info.modtime > then, "writes must advance the modification time");
}

#[tokio::test]
async fn test_root_always_exists() {
    let fs = common::new_fs().await;
    let info = dispatch::stat(&fs, ".").await.unwrap();
    assert!(info.is_dir());
}

#[tokio::test]
async fn test_size_matches_contents() {
    let fs = common::new_fs().await;
    for contents in [&b""[..], b"a", b"hello world"] {
        common::write_file(&fs, "f", contents).await;
        let info = dispatch::stat(&fs, "f").await.unwrap();
        assert_eq!(info.size, contents.len() as u64);
        assert_eq!(common::read_file(&fs, "f").await.len(), contents.len());
    }
}

#[tokio::test]
async fn test_chown_not_supported() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;
    let err = dispatch::chown(&fs, "f", 1, 1).await.unwrap_err();
    assert!(err.is(ErrorKind::NotImplemented));
}

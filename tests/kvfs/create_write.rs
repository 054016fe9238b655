use mosaicfs::fs::{dispatch, file, OpenFlags};
use mosaicfs::ErrorKind;

use crate::common;

#[tokio::test]
async fn test_create_write_read() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "foo", b"hello world").await;

    let info = dispatch::stat(&fs, "foo").await.unwrap();
    assert_eq!(info.size, 11);
    assert!(!info.is_dir());

    let mut handle = dispatch::open(&fs, "foo").await.unwrap();
    let mut contents = vec![0u8; 11];
    let mut filled = 0;
    while filled < contents.len() {
        let n = handle.read(&mut contents[filled..]).await.unwrap();
        assert!(n > 0);
        filled += n;
    }
    assert_eq!(contents, b"hello world");
    assert_eq!(handle.read(&mut [0u8; 4]).await.unwrap(), 0);
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_truncate_flag_discards_contents() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "foo", b"hello world").await;

    let flags = OpenFlags::READ_WRITE | OpenFlags::TRUNCATE;
    let mut handle = dispatch::open_file(&fs, "foo", flags, common::perm(0)).await.unwrap();
    file::write(handle.as_mut(), b"hi").await.unwrap();
    handle.close().await.unwrap();

    assert_eq!(common::read_file(&fs, "foo").await, b"hi");
    assert_eq!(dispatch::stat(&fs, "foo").await.unwrap().size, 2);
}

#[tokio::test]
async fn test_write_at_past_end_zero_fills() {
    let fs = common::new_fs().await;
    let mut handle = dispatch::create(&fs, "g").await.unwrap();
    let written = file::write_at(handle.as_mut(), b"hello", 5).await.unwrap();
    assert_eq!(written, 5);
    handle.close().await.unwrap();

    let contents = common::read_file(&fs, "g").await;
    assert_eq!(contents, b"\0\0\0\0\0hello");
    assert_eq!(dispatch::stat(&fs, "g").await.unwrap().size, 10);
}

#[tokio::test]
async fn test_write_at_overlapping_existing() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"abcdef").await;

    let flags = OpenFlags::READ_WRITE;
    let mut handle = dispatch::open_file(&fs, "f", flags, common::perm(0)).await.unwrap();
    file::write_at(handle.as_mut(), b"XY", 2).await.unwrap();
    let mut readback = [0u8; 2];
    assert_eq!(file::read_at(handle.as_ref(), &mut readback, 2).await.unwrap(), 2);
    assert_eq!(&readback, b"XY");
    handle.close().await.unwrap();

    assert_eq!(common::read_file(&fs, "f").await, b"abXYef");
}

#[tokio::test]
async fn test_append_writes_go_to_end() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "log", b"one").await;

    let flags = OpenFlags::WRITE_ONLY | OpenFlags::APPEND;
    let mut handle = dispatch::open_file(&fs, "log", flags, common::perm(0)).await.unwrap();
    file::write(handle.as_mut(), b"-two").await.unwrap();
    file::write(handle.as_mut(), b"-three").await.unwrap();
    handle.close().await.unwrap();

    assert_eq!(common::read_file(&fs, "log").await, b"one-two-three");
}

#[tokio::test]
async fn test_truncate_handle_grows_and_shrinks() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "t", b"abcdef").await;

    let mut handle =
        dispatch::open_file(&fs, "t", OpenFlags::READ_WRITE, common::perm(0)).await.unwrap();
    file::truncate(handle.as_mut(), 3).await.unwrap();
    handle.close().await.unwrap();
    assert_eq!(common::read_file(&fs, "t").await, b"abc");

    let mut handle =
        dispatch::open_file(&fs, "t", OpenFlags::READ_WRITE, common::perm(0)).await.unwrap();
    file::truncate(handle.as_mut(), 5).await.unwrap();
    handle.close().await.unwrap();
    assert_eq!(common::read_file(&fs, "t").await, b"abc\0\0");
}

#[tokio::test]
async fn test_create_requires_existing_parent() {
    let fs = common::new_fs().await;
    let err = dispatch::create(&fs, "missing/child").await.unwrap_err();
    assert!(err.is(ErrorKind::NotExist));
}

#[tokio::test]
async fn test_exclusive_create_rejects_existing() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;

    let flags = OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::EXCLUSIVE;
    let err = dispatch::open_file(&fs, "f", flags, common::perm(0o644)).await.unwrap_err();
    assert!(err.is(ErrorKind::Exist));
}

#[tokio::test]
async fn test_open_missing_without_create() {
    let fs = common::new_fs().await;
    let err = dispatch::open(&fs, "nope").await.unwrap_err();
    assert!(err.is(ErrorKind::NotExist));
    let wrapper = err.as_path_error().expect("path context");
    assert_eq!(wrapper.op, "open");
    assert_eq!(wrapper.path, "nope");
}

#[tokio::test]
async fn test_open_directory_for_write_rejected() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();

    let err = dispatch::open_file(&fs, "d", OpenFlags::WRITE_ONLY, common::perm(0))
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::IsDir));

    let err = dispatch::create(&fs, "d").await.unwrap_err();
    assert!(err.is(ErrorKind::IsDir));
}

#[tokio::test]
async fn test_read_only_handle_rejects_writes() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;

    let mut handle = dispatch::open(&fs, "f").await.unwrap();
    let err = file::write(handle.as_mut(), b"y").await.unwrap_err();
    assert!(err.is(ErrorKind::NotImplemented));
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_write_only_handle_rejects_reads() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;

    let mut handle =
        dispatch::open_file(&fs, "f", OpenFlags::WRITE_ONLY, common::perm(0)).await.unwrap();
    let err = handle.read(&mut [0u8; 1]).await.unwrap_err();
    assert!(err.is(ErrorKind::Permission));
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_closed_handle_rejects_everything() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"x").await;

    let mut handle = dispatch::open(&fs, "f").await.unwrap();
    handle.close().await.unwrap();

    let err = handle.read(&mut [0u8; 1]).await.unwrap_err();
    assert!(err.is(ErrorKind::Closed));
    let err = handle.close().await.unwrap_err();
    assert!(err.is(ErrorKind::Closed));
    let err = handle.stat().await.unwrap_err();
    assert!(err.is(ErrorKind::Closed));
}

#[tokio::test]
async fn test_conflicting_access_modes_invalid() {
    let fs = common::new_fs().await;
    let flags = OpenFlags::WRITE_ONLY | OpenFlags::READ_WRITE;
    let err = dispatch::open_file(&fs, "f", flags, common::perm(0)).await.unwrap_err();
    assert!(err.is(ErrorKind::Invalid));
}

#[tokio::test]
async fn test_invalid_paths_rejected() {
    let fs = common::new_fs().await;
    for bad in ["", "/abs", "a//b", "a/../b", "trailing/", "back\\slash"] {
        let err = dispatch::open(&fs, bad).await.unwrap_err();
        assert!(err.is(ErrorKind::Invalid), "path {bad:?} should be invalid");
    }
}

use std::io::SeekFrom;

use mosaicfs::fs::{dispatch, file, OpenFlags};
use mosaicfs::ErrorKind;

use crate::common;

#[tokio::test]
async fn test_read_file_whole_contents() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"payload").await;
    assert_eq!(common::read_file(&fs, "f").await, b"payload");
}

#[tokio::test]
async fn test_read_file_of_directory_fails() {
    let fs = common::new_fs().await;
    dispatch::mkdir(&fs, "d", common::perm(0o755)).await.unwrap();
    let err = dispatch::read_file(&fs, "d").await.unwrap_err();
    assert!(err.is(ErrorKind::IsDir));
}

#[tokio::test]
async fn test_read_at_offsets() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"abcdefgh").await;

    let handle = dispatch::open(&fs, "f").await.unwrap();
    let mut buf = [0u8; 3];
    assert_eq!(file::read_at(handle.as_ref(), &mut buf, 2).await.unwrap(), 3);
    assert_eq!(&buf, b"cde");

    // Reads past the end are short, then empty.
    assert_eq!(file::read_at(handle.as_ref(), &mut buf, 6).await.unwrap(), 2);
    assert_eq!(&buf[..2], b"gh");
    assert_eq!(file::read_at(handle.as_ref(), &mut buf, 100).await.unwrap(), 0);
}

#[tokio::test]
async fn test_seek_round_trips() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"abcdefgh").await;

    let mut handle = dispatch::open(&fs, "f").await.unwrap();
    assert_eq!(file::seek(handle.as_mut(), SeekFrom::End(0)).await.unwrap(), 8);

    assert_eq!(file::seek(handle.as_mut(), SeekFrom::Start(3)).await.unwrap(), 3);
    let mut buf = [0u8; 2];
    assert_eq!(handle.read(&mut buf).await.unwrap(), 2);
    assert_eq!(&buf, b"de");

    assert_eq!(file::seek(handle.as_mut(), SeekFrom::Current(-1)).await.unwrap(), 4);
    assert_eq!(handle.read(&mut buf).await.unwrap(), 2);
    assert_eq!(&buf, b"ef");
    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_seek_before_start_invalid() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"abc").await;

    let mut handle = dispatch::open(&fs, "f").await.unwrap();
    assert!(file::seek(handle.as_mut(), SeekFrom::Start(0)).await.is_ok());
    let err = file::seek(handle.as_mut(), SeekFrom::End(-10)).await.unwrap_err();
    assert!(err.is(ErrorKind::Invalid));
    let wrapper = err.as_path_error().expect("path context");
    assert_eq!(wrapper.op, "seek");
}

#[tokio::test]
async fn test_seek_past_end_then_write() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"ab").await;

    let mut handle =
        dispatch::open_file(&fs, "f", OpenFlags::READ_WRITE, common::perm(0)).await.unwrap();
    assert_eq!(file::seek(handle.as_mut(), SeekFrom::Start(4)).await.unwrap(), 4);
    file::write(handle.as_mut(), b"z").await.unwrap();
    handle.close().await.unwrap();

    assert_eq!(common::read_file(&fs, "f").await, b"ab\0\0z");
}

#[tokio::test]
async fn test_read_your_writes_across_handles() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"first").await;
    assert_eq!(common::read_file(&fs, "f").await, b"first");

    common::write_file(&fs, "f", b"second").await;
    assert_eq!(common::read_file(&fs, "f").await, b"second");
    assert_eq!(dispatch::stat(&fs, "f").await.unwrap().size, 6);
}

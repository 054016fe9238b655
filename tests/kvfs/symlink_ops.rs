use mosaicfs::fs::dispatch;
use mosaicfs::ErrorKind;

use crate::common;

#[tokio::test]
async fn test_symlink_not_supported() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "target", b"x").await;

    let err = dispatch::symlink(&fs, "target", "link").await.unwrap_err();
    assert!(err.is(ErrorKind::NotImplemented));
    let wrapper = err.as_link_error().expect("link context");
    assert_eq!(wrapper.op, "symlink");
}

#[tokio::test]
async fn test_lstat_falls_back_to_stat() {
    let fs = common::new_fs().await;
    common::write_file(&fs, "f", b"abc").await;

    let err = dispatch::lstat(&fs, "f").await.unwrap_err();
    assert!(err.is(ErrorKind::NotImplemented));

    let info = dispatch::lstat_or_stat(&fs, "f").await.unwrap();
    assert_eq!(info.size, 3);
}

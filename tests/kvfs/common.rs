#![allow(dead_code)]

use mosaicfs::fs::{dispatch, file, FileMode, OpenFlags};
use mosaicfs::kv::KvFs;
use mosaicfs::mem;

/// A fresh, isolated in-memory filesystem.
pub async fn new_fs() -> KvFs {
    init_logging();
    mem::new_fs().await.expect("create in-memory fs")
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

/// Creates `name` with `contents` and closes the handle.
pub async fn write_file(fs: &KvFs, name: &str, contents: &[u8]) {
    let mut handle = dispatch::create(fs, name).await.expect("create file");
    file::write(handle.as_mut(), contents).await.expect("write contents");
    handle.close().await.expect("close file");
}

pub async fn read_file(fs: &KvFs, name: &str) -> Vec<u8> {
    dispatch::read_file(fs, name).await.expect("read file")
}

pub fn perm(bits: u32) -> FileMode {
    FileMode::new(bits)
}

pub fn rw_flags() -> OpenFlags {
    OpenFlags::READ_WRITE
}

//! Generic operation dispatch over the capability probes.
//!
//! Each helper tries, in order: the native capability when advertised, the
//! [`MountPointFs`] indirection (recursing into the nested filesystem with
//! the remapped sub-path), then a generic fallback when one is
//! semantically sound. With none of those available the helper reports
//! `NotImplemented` wrapped with the operation's verb.

use std::sync::Arc;
use std::time::SystemTime;

use futures::future::BoxFuture;

use crate::error::{link_error, path_error, ErrorKind, Result};
use crate::fs::file::{self, File};
use crate::fs::{DirEntry, FileInfo, FileMode, Fs, OpenFlags};
use crate::path;
use crate::sub::SubDirFs;

fn route<'a>(fs: &'a dyn Fs, name: &str) -> Option<(Arc<dyn Fs>, String)> {
    fs.as_mount().map(|router| router.mount(name))
}

/// Opens `name` read-only.
pub async fn open(fs: &dyn Fs, name: &str) -> Result<Box<dyn File>> {
    if !path::valid(name) {
        return Err(path_error("open", name, ErrorKind::Invalid));
    }
    fs.open(name).await
}

/// Opens `name` with `flags`, creating with permissions `perm` when asked.
pub fn open_file<'a>(
    fs: &'a dyn Fs,
    name: &'a str,
    flags: OpenFlags,
    perm: FileMode,
) -> BoxFuture<'a, Result<Box<dyn File>>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("open", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_open_file() {
            return capable.open_file(name, flags, perm).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return open_file(inner.as_ref(), &sub_path, flags, perm).await;
        }
        if flags == OpenFlags::READ_ONLY {
            return fs.open(name).await;
        }
        Err(path_error("open", name, ErrorKind::NotImplemented))
    })
}

/// Creates (or truncates) `name` for read-write access.
pub fn create<'a>(fs: &'a dyn Fs, name: &'a str) -> BoxFuture<'a, Result<Box<dyn File>>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("create", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_create() {
            return capable.create(name).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return create(inner.as_ref(), &sub_path).await;
        }
        let flags = OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE;
        open_file(fs, name, flags, FileMode::new(0o666)).await
    })
}

/// Creates the directory `name`.
pub fn mkdir<'a>(fs: &'a dyn Fs, name: &'a str, perm: FileMode) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("mkdir", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_mkdir() {
            return capable.mkdir(name, perm).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return mkdir(inner.as_ref(), &sub_path, perm).await;
        }
        Err(path_error("mkdir", name, ErrorKind::NotImplemented))
    })
}

/// Creates every missing directory along `target`.
pub fn mkdir_all<'a>(fs: &'a dyn Fs, target: &'a str, perm: FileMode) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if !path::valid(target) {
            return Err(path_error("mkdir", target, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_mkdir_all() {
            return capable.mkdir_all(target, perm).await;
        }
        if let Some((inner, sub_path)) = route(fs, target) {
            return mkdir_all(inner.as_ref(), &sub_path, perm).await;
        }
        if target == path::ROOT {
            return Ok(());
        }
        for prefix in path::prefixes(target) {
            match mkdir(fs, prefix, perm).await {
                Ok(()) => {}
                Err(err) if err.is(ErrorKind::Exist) => {
                    let info = stat(fs, prefix).await?;
                    if !info.is_dir() {
                        return Err(path_error("mkdir", prefix, ErrorKind::NotDir));
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    })
}

/// Lists the directory `name`.
pub fn read_dir<'a>(fs: &'a dyn Fs, name: &'a str) -> BoxFuture<'a, Result<Vec<DirEntry>>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("readdir", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_read_dir() {
            return capable.read_dir(name).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return read_dir(inner.as_ref(), &sub_path).await;
        }
        let mut handle = fs.open(name).await?;
        let entries = file::read_dir(handle.as_mut(), -1).await;
        let _ = handle.close().await;
        entries.map_err(|err| err.with_path("readdir", name))
    })
}

/// Reads the whole contents of `name`.
pub fn read_file<'a>(fs: &'a dyn Fs, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("open", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_read_file() {
            return capable.read_file(name).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return read_file(inner.as_ref(), &sub_path).await;
        }
        let mut handle = fs.open(name).await?;
        let mut out = Vec::new();
        let read = file::read_to_end(handle.as_mut(), &mut out).await;
        let _ = handle.close().await;
        read.map_err(|err| err.with_path("read", name))?;
        Ok(out)
    })
}

/// Metadata for `name`.
pub fn stat<'a>(fs: &'a dyn Fs, name: &'a str) -> BoxFuture<'a, Result<FileInfo>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("stat", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_stat() {
            return capable.stat(name).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return stat(inner.as_ref(), &sub_path).await;
        }
        let mut handle = fs.open(name).await?;
        let info = handle.stat().await;
        let _ = handle.close().await;
        info.map_err(|err| err.with_path("stat", name))
    })
}

/// Metadata for `name` without following a trailing symlink.
pub fn lstat<'a>(fs: &'a dyn Fs, name: &'a str) -> BoxFuture<'a, Result<FileInfo>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("lstat", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_lstat() {
            return capable.lstat(name).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return lstat(inner.as_ref(), &sub_path).await;
        }
        Err(path_error("lstat", name, ErrorKind::NotImplemented))
    })
}

/// `lstat`, falling back to `stat` where symlinks are not distinguished.
pub async fn lstat_or_stat(fs: &dyn Fs, name: &str) -> Result<FileInfo> {
    match lstat(fs, name).await {
        Err(err) if err.is(ErrorKind::NotImplemented) => stat(fs, name).await,
        other => other,
    }
}

/// Changes the permission bits of `name`.
pub fn chmod<'a>(fs: &'a dyn Fs, name: &'a str, mode: FileMode) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("chmod", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_chmod() {
            return capable.chmod(name, mode).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return chmod(inner.as_ref(), &sub_path, mode).await;
        }
        let mut handle = fs.open(name).await?;
        let outcome = file::chmod(handle.as_mut(), mode).await;
        let _ = handle.close().await;
        outcome
    })
}

/// Changes the ownership of `name`.
pub fn chown<'a>(fs: &'a dyn Fs, name: &'a str, uid: u32, gid: u32) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("chown", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_chown() {
            return capable.chown(name, uid, gid).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return chown(inner.as_ref(), &sub_path, uid, gid).await;
        }
        let mut handle = fs.open(name).await?;
        let outcome = file::chown(handle.as_mut(), uid, gid).await;
        let _ = handle.close().await;
        outcome
    })
}

/// Changes the timestamps of `name`.
pub fn chtimes<'a>(
    fs: &'a dyn Fs,
    name: &'a str,
    atime: Option<SystemTime>,
    mtime: Option<SystemTime>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("chtimes", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_chtimes() {
            return capable.chtimes(name, atime, mtime).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return chtimes(inner.as_ref(), &sub_path, atime, mtime).await;
        }
        let mut handle = fs.open(name).await?;
        let outcome = file::chtimes(handle.as_mut(), atime, mtime).await;
        let _ = handle.close().await;
        outcome
    })
}

/// Removes the file or empty directory `name`.
pub fn remove<'a>(fs: &'a dyn Fs, name: &'a str) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("remove", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_remove() {
            return capable.remove(name).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return remove(inner.as_ref(), &sub_path).await;
        }
        Err(path_error("remove", name, ErrorKind::NotImplemented))
    })
}

/// Removes `name` and any children. A missing target is not an error.
pub fn remove_all<'a>(fs: &'a dyn Fs, name: &'a str) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if !path::valid(name) {
            return Err(path_error("remove", name, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_remove_all() {
            return capable.remove_all(name).await;
        }
        if let Some((inner, sub_path)) = route(fs, name) {
            return remove_all(inner.as_ref(), &sub_path).await;
        }
        let info = match stat(fs, name).await {
            Ok(info) => info,
            Err(err) if err.is(ErrorKind::NotExist) => return Ok(()),
            Err(err) => return Err(err),
        };
        if info.is_dir() {
            for entry in read_dir(fs, name).await? {
                let child = path::join(name, entry.name());
                remove_all(fs, &child).await?;
            }
        }
        remove(fs, name).await
    })
}

/// Renames `old` to `new` within one filesystem.
pub fn rename<'a>(fs: &'a dyn Fs, old: &'a str, new: &'a str) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if !path::valid(old) || !path::valid(new) {
            return Err(link_error("rename", old, new, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_rename() {
            return capable.rename(old, new).await;
        }
        if let (Some((old_fs, old_sub)), Some((new_fs, new_sub))) =
            (route(fs, old), route(fs, new))
        {
            // Cross-mount renames would need a copy; refuse them instead.
            if !Arc::ptr_eq(&old_fs, &new_fs) {
                return Err(link_error("rename", old, new, ErrorKind::Invalid));
            }
            return rename(old_fs.as_ref(), &old_sub, &new_sub).await;
        }
        Err(link_error("rename", old, new, ErrorKind::NotImplemented))
    })
}

/// Creates a symbolic link at `new` pointing at `old`.
pub fn symlink<'a>(fs: &'a dyn Fs, old: &'a str, new: &'a str) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if !path::valid(new) {
            return Err(link_error("symlink", old, new, ErrorKind::Invalid));
        }
        if let Some(capable) = fs.as_symlink() {
            return capable.symlink(old, new).await;
        }
        if let Some((inner, sub_path)) = route(fs, new) {
            return symlink(inner.as_ref(), old, &sub_path).await;
        }
        Err(link_error("symlink", old, new, ErrorKind::NotImplemented))
    })
}

/// Derives a filesystem rooted at `dir`.
pub async fn sub(fs: Arc<dyn Fs>, dir: &str) -> Result<Arc<dyn Fs>> {
    if let Some(capable) = fs.as_sub() {
        return capable.sub(dir).await;
    }
    Ok(Arc::new(SubDirFs::new(fs, dir)?))
}

/// Resolves `name` through the mount capability, or to `fs` itself.
pub fn mount(fs: &Arc<dyn Fs>, name: &str) -> (Arc<dyn Fs>, String) {
    match fs.as_mount() {
        Some(router) => router.mount(name),
        None => (fs.clone(), name.to_owned()),
    }
}

//! Path-rooted filesystem views --- [`SubDirFs`].
//!
//! A view prefixes every outbound path with its root directory and strips
//! that prefix from error paths on the way back, so callers never observe
//! paths outside their root. Chained views compose their prefixes.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::{path_error, ErrorKind, FsError, LinkError, PathError, Result};
use crate::fs::{
    dispatch, ChmodFs, ChownFs, ChtimesFs, CreateFs, DirEntry, File, FileInfo, FileMode, Fs,
    LstatFs, MkdirAllFs, MkdirFs, OpenFileFs, OpenFlags, ReadDirFs, ReadFileFs, RemoveAllFs,
    RemoveFs, RenameFs, StatFs, SubFs, SymlinkFs,
};
use crate::path;

/// A filesystem exposing the subtree of another filesystem rooted at a
/// directory.
pub struct SubDirFs {
    inner: Arc<dyn Fs>,
    prefix: String,
}

impl SubDirFs {
    /// Roots a view of `inner` at `dir`.
    pub fn new(inner: Arc<dyn Fs>, dir: &str) -> Result<SubDirFs> {
        if !path::valid(dir) {
            return Err(path_error("sub", dir, ErrorKind::Invalid));
        }
        Ok(SubDirFs { inner, prefix: dir.to_owned() })
    }

    fn outbound(&self, op: &'static str, name: &str) -> Result<String> {
        if !path::valid(name) {
            return Err(path_error(op, name, ErrorKind::Invalid));
        }
        Ok(path::join(&self.prefix, name))
    }

    fn strip(&self, reported: &str) -> String {
        path::strip_prefix(reported, &self.prefix).unwrap_or(reported).to_owned()
    }

    fn rewrite(&self, err: FsError) -> FsError {
        match err {
            FsError::Path(PathError { op, path: reported, source }) => {
                FsError::Path(PathError { op, path: self.strip(&reported), source })
            }
            FsError::Link(LinkError { op, old, new, source }) => FsError::Link(LinkError {
                op,
                old: self.strip(&old),
                new: self.strip(&new),
                source,
            }),
            other => other,
        }
    }
}

#[async_trait]
impl Fs for SubDirFs {
    async fn open(&self, name: &str) -> Result<Box<dyn File>> {
        let target = self.outbound("open", name)?;
        dispatch::open(self.inner.as_ref(), &target).await.map_err(|err| self.rewrite(err))
    }

    fn as_open_file(&self) -> Option<&dyn OpenFileFs> {
        Some(self)
    }

    fn as_create(&self) -> Option<&dyn CreateFs> {
        Some(self)
    }

    fn as_mkdir(&self) -> Option<&dyn MkdirFs> {
        Some(self)
    }

    fn as_mkdir_all(&self) -> Option<&dyn MkdirAllFs> {
        Some(self)
    }

    fn as_read_dir(&self) -> Option<&dyn ReadDirFs> {
        Some(self)
    }

    fn as_sub(&self) -> Option<&dyn SubFs> {
        Some(self)
    }

    fn as_remove(&self) -> Option<&dyn RemoveFs> {
        Some(self)
    }

    fn as_remove_all(&self) -> Option<&dyn RemoveAllFs> {
        Some(self)
    }

    fn as_rename(&self) -> Option<&dyn RenameFs> {
        Some(self)
    }

    fn as_symlink(&self) -> Option<&dyn SymlinkFs> {
        Some(self)
    }

    fn as_stat(&self) -> Option<&dyn StatFs> {
        Some(self)
    }

    fn as_lstat(&self) -> Option<&dyn LstatFs> {
        Some(self)
    }

    fn as_chmod(&self) -> Option<&dyn ChmodFs> {
        Some(self)
    }

    fn as_chown(&self) -> Option<&dyn ChownFs> {
        Some(self)
    }

    fn as_chtimes(&self) -> Option<&dyn ChtimesFs> {
        Some(self)
    }

    fn as_read_file(&self) -> Option<&dyn ReadFileFs> {
        Some(self)
    }
}

#[async_trait]
impl OpenFileFs for SubDirFs {
    async fn open_file(
        &self,
        name: &str,
        flags: OpenFlags,
        perm: FileMode,
    ) -> Result<Box<dyn File>> {
        let target = self.outbound("open", name)?;
        dispatch::open_file(self.inner.as_ref(), &target, flags, perm)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl CreateFs for SubDirFs {
    async fn create(&self, name: &str) -> Result<Box<dyn File>> {
        let target = self.outbound("create", name)?;
        dispatch::create(self.inner.as_ref(), &target).await.map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl MkdirFs for SubDirFs {
    async fn mkdir(&self, name: &str, perm: FileMode) -> Result<()> {
        let target = self.outbound("mkdir", name)?;
        dispatch::mkdir(self.inner.as_ref(), &target, perm)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl MkdirAllFs for SubDirFs {
    async fn mkdir_all(&self, target: &str, perm: FileMode) -> Result<()> {
        let target = self.outbound("mkdir", target)?;
        dispatch::mkdir_all(self.inner.as_ref(), &target, perm)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl ReadDirFs for SubDirFs {
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        let target = self.outbound("readdir", name)?;
        dispatch::read_dir(self.inner.as_ref(), &target)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl SubFs for SubDirFs {
    async fn sub(&self, dir: &str) -> Result<Arc<dyn Fs>> {
        let target = self.outbound("sub", dir)?;
        Ok(Arc::new(SubDirFs { inner: self.inner.clone(), prefix: target }))
    }
}

#[async_trait]
impl RemoveFs for SubDirFs {
    async fn remove(&self, name: &str) -> Result<()> {
        let target = self.outbound("remove", name)?;
        dispatch::remove(self.inner.as_ref(), &target).await.map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl RemoveAllFs for SubDirFs {
    async fn remove_all(&self, name: &str) -> Result<()> {
        let target = self.outbound("remove", name)?;
        dispatch::remove_all(self.inner.as_ref(), &target)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl RenameFs for SubDirFs {
    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old_target = self.outbound("rename", old)?;
        let new_target = self.outbound("rename", new)?;
        dispatch::rename(self.inner.as_ref(), &old_target, &new_target)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl SymlinkFs for SubDirFs {
    async fn symlink(&self, old: &str, new: &str) -> Result<()> {
        let old_target = self.outbound("symlink", old)?;
        let new_target = self.outbound("symlink", new)?;
        dispatch::symlink(self.inner.as_ref(), &old_target, &new_target)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl StatFs for SubDirFs {
    async fn stat(&self, name: &str) -> Result<FileInfo> {
        let target = self.outbound("stat", name)?;
        dispatch::stat(self.inner.as_ref(), &target).await.map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl LstatFs for SubDirFs {
    async fn lstat(&self, name: &str) -> Result<FileInfo> {
        let target = self.outbound("lstat", name)?;
        dispatch::lstat(self.inner.as_ref(), &target).await.map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl ChmodFs for SubDirFs {
    async fn chmod(&self, name: &str, mode: FileMode) -> Result<()> {
        let target = self.outbound("chmod", name)?;
        dispatch::chmod(self.inner.as_ref(), &target, mode)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl ChownFs for SubDirFs {
    async fn chown(&self, name: &str, uid: u32, gid: u32) -> Result<()> {
        let target = self.outbound("chown", name)?;
        dispatch::chown(self.inner.as_ref(), &target, uid, gid)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl ChtimesFs for SubDirFs {
    async fn chtimes(
        &self,
        name: &str,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Result<()> {
        let target = self.outbound("chtimes", name)?;
        dispatch::chtimes(self.inner.as_ref(), &target, atime, mtime)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

#[async_trait]
impl ReadFileFs for SubDirFs {
    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let target = self.outbound("open", name)?;
        dispatch::read_file(self.inner.as_ref(), &target)
            .await
            .map_err(|err| self.rewrite(err))
    }
}

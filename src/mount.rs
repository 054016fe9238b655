//! Mount composition --- [`MountFs`].
//!
//! A composer holds a root filesystem and a set of sub-filesystems
//! attached at directories. Paths route to the mount with the longest
//! matching prefix; errors coming back from a mounted filesystem have the
//! mount prefix restored, so callers always see the paths they passed in.
//! Mounts are never removed.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{link_error, path_error, ErrorKind, FsError, LinkError, PathError, Result};
use crate::fs::{
    dispatch, ChmodFs, ChownFs, ChtimesFs, CreateFs, DirEntry, File, FileInfo, FileMode, Fs,
    LstatFs, MkdirAllFs, MkdirFs, MountPointFs, OpenFileFs, OpenFlags, ReadDirFs, ReadFileFs,
    RemoveAllFs, RemoveFs, RenameFs, StatFs, SymlinkFs,
};
use crate::path;

/// A route resolved by the composer: the responsible filesystem, the
/// remapped sub-path, and the mount prefix to restore in errors.
struct Route {
    fs: Arc<dyn Fs>,
    sub_path: String,
    prefix: Option<String>,
}

/// Filesystem composing a root and any number of mounted sub-filesystems.
pub struct MountFs {
    root: Arc<dyn Fs>,
    mounts: DashMap<String, Arc<dyn Fs>>,
    add_lock: Mutex<()>,
}

impl MountFs {
    pub fn new(root: Arc<dyn Fs>) -> MountFs {
        MountFs { root, mounts: DashMap::new(), add_lock: Mutex::new(()) }
    }

    /// Attaches `fs` at `mount_path`, which must name an existing
    /// directory not already carrying a mount.
    pub async fn add_mount(&self, mount_path: &str, fs: Arc<dyn Fs>) -> Result<()> {
        if !path::valid(mount_path) || mount_path == path::ROOT {
            return Err(path_error("mount", mount_path, ErrorKind::Invalid));
        }
        let _guard = self.add_lock.lock().await;
        if self.mounts.contains_key(mount_path) {
            return Err(path_error("mount", mount_path, ErrorKind::Exist));
        }
        // The target must resolve, through any existing mounts, to a
        // directory.
        let info = self.stat_routed(mount_path).await?;
        if !info.is_dir() {
            return Err(path_error("mount", mount_path, ErrorKind::NotDir));
        }
        debug!(mount_path, "adding mount");
        self.mounts.insert(mount_path.to_owned(), fs);
        Ok(())
    }

    /// The currently mounted paths, in no particular order.
    pub fn mount_points(&self) -> Vec<String> {
        self.mounts.iter().map(|item| item.key().clone()).collect()
    }

    fn route(&self, name: &str) -> Route {
        let mut best: Option<(String, Arc<dyn Fs>)> = None;
        for item in self.mounts.iter() {
            if path::has_prefix(name, item.key()) {
                let longer =
                    best.as_ref().map_or(true, |(prev, _)| item.key().len() > prev.len());
                if longer {
                    best = Some((item.key().clone(), item.value().clone()));
                }
            }
        }
        match best {
            None => Route { fs: self.root.clone(), sub_path: name.to_owned(), prefix: None },
            Some((prefix, fs)) => {
                let sub_path =
                    path::strip_prefix(name, &prefix).unwrap_or(path::ROOT).to_owned();
                Route { fs, sub_path, prefix: Some(prefix) }
            }
        }
    }

    async fn stat_routed(&self, name: &str) -> Result<FileInfo> {
        let route = self.route(name);
        dispatch::stat(route.fs.as_ref(), &route.sub_path)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

/// Restores the mount prefix in error paths reported by a mounted
/// filesystem.
fn restore(err: FsError, prefix: &Option<String>) -> FsError {
    let Some(prefix) = prefix else { return err };
    match err {
        FsError::Path(PathError { op, path: reported, source }) => {
            FsError::Path(PathError { op, path: path::join(prefix, &reported), source })
        }
        FsError::Link(LinkError { op, old, new, source }) => FsError::Link(LinkError {
            op,
            old: path::join(prefix, &old),
            new: path::join(prefix, &new),
            source,
        }),
        other => other,
    }
}

#[async_trait]
impl Fs for MountFs {
    async fn open(&self, name: &str) -> Result<Box<dyn File>> {
        if !path::valid(name) {
            return Err(path_error("open", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::open(route.fs.as_ref(), &route.sub_path)
            .await
            .map_err(|err| restore(err, &route.prefix))
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

    fn as_mount(&self) -> Option<&dyn MountPointFs> {
        Some(self)
    }
}

impl MountPointFs for MountFs {
    fn mount(&self, name: &str) -> (Arc<dyn Fs>, String) {
        let route = self.route(name);
        (route.fs, route.sub_path)
    }
}

#[async_trait]
impl OpenFileFs for MountFs {
    async fn open_file(
        &self,
        name: &str,
        flags: OpenFlags,
        perm: FileMode,
    ) -> Result<Box<dyn File>> {
        if !path::valid(name) {
            return Err(path_error("open", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::open_file(route.fs.as_ref(), &route.sub_path, flags, perm)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl CreateFs for MountFs {
    async fn create(&self, name: &str) -> Result<Box<dyn File>> {
        if !path::valid(name) {
            return Err(path_error("create", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::create(route.fs.as_ref(), &route.sub_path)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl MkdirFs for MountFs {
    async fn mkdir(&self, name: &str, perm: FileMode) -> Result<()> {
        if !path::valid(name) {
            return Err(path_error("mkdir", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::mkdir(route.fs.as_ref(), &route.sub_path, perm)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl MkdirAllFs for MountFs {
    async fn mkdir_all(&self, target: &str, perm: FileMode) -> Result<()> {
        if !path::valid(target) {
            return Err(path_error("mkdir", target, ErrorKind::Invalid));
        }
        let route = self.route(target);
        dispatch::mkdir_all(route.fs.as_ref(), &route.sub_path, perm)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl ReadDirFs for MountFs {
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        if !path::valid(name) {
            return Err(path_error("readdir", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::read_dir(route.fs.as_ref(), &route.sub_path)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl RemoveFs for MountFs {
    async fn remove(&self, name: &str) -> Result<()> {
        if !path::valid(name) {
            return Err(path_error("remove", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::remove(route.fs.as_ref(), &route.sub_path)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl RemoveAllFs for MountFs {
    async fn remove_all(&self, name: &str) -> Result<()> {
        if !path::valid(name) {
            return Err(path_error("remove", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::remove_all(route.fs.as_ref(), &route.sub_path)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl RenameFs for MountFs {
    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        if !path::valid(old) || !path::valid(new) {
            return Err(link_error("rename", old, new, ErrorKind::Invalid));
        }
        let old_route = self.route(old);
        let new_route = self.route(new);
        if !Arc::ptr_eq(&old_route.fs, &new_route.fs) {
            // Renames never cross a mount boundary.
            return Err(link_error("rename", old, new, ErrorKind::Invalid));
        }
        dispatch::rename(old_route.fs.as_ref(), &old_route.sub_path, &new_route.sub_path)
            .await
            .map_err(|err| restore(err, &old_route.prefix))
    }
}

#[async_trait]
impl SymlinkFs for MountFs {
    async fn symlink(&self, old: &str, new: &str) -> Result<()> {
        if !path::valid(new) {
            return Err(link_error("symlink", old, new, ErrorKind::Invalid));
        }
        let route = self.route(new);
        dispatch::symlink(route.fs.as_ref(), old, &route.sub_path)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl StatFs for MountFs {
    async fn stat(&self, name: &str) -> Result<FileInfo> {
        if !path::valid(name) {
            return Err(path_error("stat", name, ErrorKind::Invalid));
        }
        self.stat_routed(name).await
    }
}

#[async_trait]
impl LstatFs for MountFs {
    async fn lstat(&self, name: &str) -> Result<FileInfo> {
        if !path::valid(name) {
            return Err(path_error("lstat", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::lstat(route.fs.as_ref(), &route.sub_path)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl ChmodFs for MountFs {
    async fn chmod(&self, name: &str, mode: FileMode) -> Result<()> {
        if !path::valid(name) {
            return Err(path_error("chmod", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::chmod(route.fs.as_ref(), &route.sub_path, mode)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl ChownFs for MountFs {
    async fn chown(&self, name: &str, uid: u32, gid: u32) -> Result<()> {
        if !path::valid(name) {
            return Err(path_error("chown", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::chown(route.fs.as_ref(), &route.sub_path, uid, gid)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl ChtimesFs for MountFs {
    async fn chtimes(
        &self,
        name: &str,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Result<()> {
        if !path::valid(name) {
            return Err(path_error("chtimes", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::chtimes(route.fs.as_ref(), &route.sub_path, atime, mtime)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

#[async_trait]
impl ReadFileFs for MountFs {
    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        if !path::valid(name) {
            return Err(path_error("open", name, ErrorKind::Invalid));
        }
        let route = self.route(name);
        dispatch::read_file(route.fs.as_ref(), &route.sub_path)
            .await
            .map_err(|err| restore(err, &route.prefix))
    }
}

//! The filesystem capability model --- [`Fs`] and the optional
//! capability traits.
//!
//! A backend implements [`Fs`] (the `open` operation) and opts into any
//! subset of the capability traits, advertising each by overriding the
//! matching `as_*` probe to return itself. Callers go through the
//! [`dispatch`] helpers, which consult the advertised set, route through a
//! [`MountPointFs`] when one is present, fall back to a generic rendering
//! where that is semantically sound, and otherwise report
//! `NotImplemented`.

pub mod dispatch;
pub mod file;
mod info;
mod walk;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::Result;

pub use file::File;
pub use info::{DirEntry, FileInfo, FileMode, OpenFlags};
pub use walk::{walk_dir, WalkAction};

/// A virtual filesystem.
///
/// `open` is the only mandatory operation; everything else is advertised
/// through the capability probes.
#[async_trait]
pub trait Fs: Send + Sync {
    /// Opens `name` for reading.
    async fn open(&self, name: &str) -> Result<Box<dyn File>>;

    fn as_open_file(&self) -> Option<&dyn OpenFileFs> {
        None
    }

    fn as_create(&self) -> Option<&dyn CreateFs> {
        None
    }

    fn as_mkdir(&self) -> Option<&dyn MkdirFs> {
        None
    }

    fn as_mkdir_all(&self) -> Option<&dyn MkdirAllFs> {
        None
    }

    fn as_read_dir(&self) -> Option<&dyn ReadDirFs> {
        None
    }

    fn as_sub(&self) -> Option<&dyn SubFs> {
        None
    }

    fn as_remove(&self) -> Option<&dyn RemoveFs> {
        None
    }

    fn as_remove_all(&self) -> Option<&dyn RemoveAllFs> {
        None
    }

    fn as_rename(&self) -> Option<&dyn RenameFs> {
        None
    }

    fn as_symlink(&self) -> Option<&dyn SymlinkFs> {
        None
    }

    fn as_stat(&self) -> Option<&dyn StatFs> {
        None
    }

    fn as_lstat(&self) -> Option<&dyn LstatFs> {
        None
    }

    fn as_chmod(&self) -> Option<&dyn ChmodFs> {
        None
    }

    fn as_chown(&self) -> Option<&dyn ChownFs> {
        None
    }

    fn as_chtimes(&self) -> Option<&dyn ChtimesFs> {
        None
    }

    fn as_read_file(&self) -> Option<&dyn ReadFileFs> {
        None
    }

    fn as_mount(&self) -> Option<&dyn MountPointFs> {
        None
    }
}

/// Opening with explicit flags and creation permissions.
#[async_trait]
pub trait OpenFileFs: Fs {
    async fn open_file(
        &self,
        name: &str,
        flags: OpenFlags,
        perm: FileMode,
    ) -> Result<Box<dyn File>>;
}

/// Creating (or truncating) a file for read-write access.
#[async_trait]
pub trait CreateFs: Fs {
    async fn create(&self, name: &str) -> Result<Box<dyn File>>;
}

/// Creating a single directory.
#[async_trait]
pub trait MkdirFs: Fs {
    async fn mkdir(&self, name: &str, perm: FileMode) -> Result<()>;
}

/// Creating a directory chain.
#[async_trait]
pub trait MkdirAllFs: Fs {
    async fn mkdir_all(&self, path: &str, perm: FileMode) -> Result<()>;
}

/// Listing a directory.
#[async_trait]
pub trait ReadDirFs: Fs {
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>>;
}

/// Deriving a filesystem rooted at a sub-directory.
#[async_trait]
pub trait SubFs: Fs {
    async fn sub(&self, dir: &str) -> Result<Arc<dyn Fs>>;
}

/// Removing a file or empty directory.
#[async_trait]
pub trait RemoveFs: Fs {
    async fn remove(&self, name: &str) -> Result<()>;
}

/// Removing a tree.
#[async_trait]
pub trait RemoveAllFs: Fs {
    async fn remove_all(&self, name: &str) -> Result<()>;
}

/// Renaming.
///
/// Renaming a non-empty directory is not atomic: an error part-way can
/// leave both trees partially populated.
#[async_trait]
pub trait RenameFs: Fs {
    async fn rename(&self, old: &str, new: &str) -> Result<()>;
}

/// Creating symbolic links.
#[async_trait]
pub trait SymlinkFs: Fs {
    async fn symlink(&self, old: &str, new: &str) -> Result<()>;
}

/// Metadata lookup.
#[async_trait]
pub trait StatFs: Fs {
    async fn stat(&self, name: &str) -> Result<FileInfo>;
}

/// Metadata lookup without following a trailing symlink.
#[async_trait]
pub trait LstatFs: Fs {
    async fn lstat(&self, name: &str) -> Result<FileInfo>;
}

/// Permission changes.
#[async_trait]
pub trait ChmodFs: Fs {
    async fn chmod(&self, name: &str, mode: FileMode) -> Result<()>;
}

/// Ownership changes.
#[async_trait]
pub trait ChownFs: Fs {
    async fn chown(&self, name: &str, uid: u32, gid: u32) -> Result<()>;
}

/// Timestamp changes.
#[async_trait]
pub trait ChtimesFs: Fs {
    async fn chtimes(
        &self,
        name: &str,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Result<()>;
}

/// Whole-file reads.
#[async_trait]
pub trait ReadFileFs: Fs {
    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;
}

/// Path routing into nested filesystems.
pub trait MountPointFs: Fs {
    /// Resolves `name` to the filesystem responsible for it and the
    /// remapped sub-path within that filesystem.
    fn mount(&self, name: &str) -> (Arc<dyn Fs>, String);
}

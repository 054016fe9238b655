//! Open file handles and their optional capabilities.
//!
//! [`File`] is the base handle contract: a name, metadata, sequential
//! reads and an idempotent-fail close. Everything else is a capability a
//! handle opts into through the `as_*` probes. The free functions in this
//! module dispatch through the probes and report `NotImplemented` in a
//! `PathError` labeled with the handle's name when a capability is absent.

use std::io::SeekFrom;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::{path_error, ErrorKind, Result};
use crate::fs::info::{DirEntry, FileInfo, FileMode};

/// An open file handle.
///
/// Handles are ephemeral and single-owner; share one across tasks only
/// behind external synchronization. Every operation on a closed handle
/// reports `Closed`.
#[async_trait]
pub trait File: Send {
    /// The path this handle was opened with.
    fn name(&self) -> &str;

    /// Metadata for the open file.
    async fn stat(&self) -> Result<FileInfo>;

    /// Reads into `buf` at the handle cursor, advancing it. Returns
    /// `Ok(0)` at end of data.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Releases the handle. A second close reports `Closed`.
    async fn close(&mut self) -> Result<()>;

    fn as_write(&mut self) -> Option<&mut dyn WriteFile> {
        None
    }

    fn as_read_at(&self) -> Option<&dyn ReadAtFile> {
        None
    }

    fn as_write_at(&mut self) -> Option<&mut dyn WriteAtFile> {
        None
    }

    fn as_seek(&mut self) -> Option<&mut dyn SeekFile> {
        None
    }

    fn as_read_dir(&mut self) -> Option<&mut dyn ReadDirFile> {
        None
    }

    fn as_sync(&mut self) -> Option<&mut dyn SyncFile> {
        None
    }

    fn as_truncate(&mut self) -> Option<&mut dyn TruncateFile> {
        None
    }

    fn as_chmod(&mut self) -> Option<&mut dyn ChmodFile> {
        None
    }

    fn as_chown(&mut self) -> Option<&mut dyn ChownFile> {
        None
    }

    fn as_chtimes(&mut self) -> Option<&mut dyn ChtimesFile> {
        None
    }
}

/// Sequential writes at the handle cursor.
#[async_trait]
pub trait WriteFile: File {
    async fn write(&mut self, buf: &[u8]) -> Result<usize>;
}

/// Positioned reads; the handle cursor is untouched.
#[async_trait]
pub trait ReadAtFile: File {
    async fn read_at(&self, buf: &mut [u8], off: u64) -> Result<usize>;
}

/// Positioned writes; the handle cursor is untouched.
#[async_trait]
pub trait WriteAtFile: File {
    async fn write_at(&mut self, buf: &[u8], off: u64) -> Result<usize>;
}

/// Cursor repositioning.
#[async_trait]
pub trait SeekFile: File {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
}

/// Directory iteration with a per-handle cursor.
#[async_trait]
pub trait ReadDirFile: File {
    /// Returns the next `n` entries, or all remaining when `n <= 0`.
    async fn read_dir(&mut self, n: isize) -> Result<Vec<DirEntry>>;
}

/// Flushes pending state to the backend.
#[async_trait]
pub trait SyncFile: File {
    async fn sync(&mut self) -> Result<()>;
}

/// Resizing.
#[async_trait]
pub trait TruncateFile: File {
    async fn truncate(&mut self, size: u64) -> Result<()>;
}

/// Permission changes through the handle.
#[async_trait]
pub trait ChmodFile: File {
    async fn chmod(&mut self, mode: FileMode) -> Result<()>;
}

/// Ownership changes through the handle.
#[async_trait]
pub trait ChownFile: File {
    async fn chown(&mut self, uid: u32, gid: u32) -> Result<()>;
}

/// Timestamp changes through the handle.
#[async_trait]
pub trait ChtimesFile: File {
    async fn chtimes(&mut self, atime: Option<SystemTime>, mtime: Option<SystemTime>)
        -> Result<()>;
}

impl std::fmt::Debug for dyn File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File").field("name", &self.name()).finish()
    }
}

/// [`WriteFile::write`] through the capability probe.
pub async fn write(file: &mut dyn File, buf: &[u8]) -> Result<usize> {
    let name = file.name().to_owned();
    match file.as_write() {
        Some(capable) => capable.write(buf).await,
        None => Err(path_error("write", name, ErrorKind::NotImplemented)),
    }
}

/// [`ReadAtFile::read_at`] through the capability probe.
pub async fn read_at(file: &dyn File, buf: &mut [u8], off: u64) -> Result<usize> {
    match file.as_read_at() {
        Some(capable) => capable.read_at(buf, off).await,
        None => Err(path_error("readat", file.name().to_owned(), ErrorKind::NotImplemented)),
    }
}

/// [`WriteAtFile::write_at`] through the capability probe.
pub async fn write_at(file: &mut dyn File, buf: &[u8], off: u64) -> Result<usize> {
    let name = file.name().to_owned();
    match file.as_write_at() {
        Some(capable) => capable.write_at(buf, off).await,
        None => Err(path_error("writeat", name, ErrorKind::NotImplemented)),
    }
}

/// [`SeekFile::seek`] through the capability probe.
pub async fn seek(file: &mut dyn File, pos: SeekFrom) -> Result<u64> {
    let name = file.name().to_owned();
    match file.as_seek() {
        Some(capable) => capable.seek(pos).await,
        None => Err(path_error("seek", name, ErrorKind::NotImplemented)),
    }
}

/// [`ReadDirFile::read_dir`] through the capability probe.
pub async fn read_dir(file: &mut dyn File, n: isize) -> Result<Vec<DirEntry>> {
    let name = file.name().to_owned();
    match file.as_read_dir() {
        Some(capable) => capable.read_dir(n).await,
        None => Err(path_error("readdir", name, ErrorKind::NotImplemented)),
    }
}

/// [`SyncFile::sync`] through the capability probe.
pub async fn sync(file: &mut dyn File) -> Result<()> {
    let name = file.name().to_owned();
    match file.as_sync() {
        Some(capable) => capable.sync().await,
        None => Err(path_error("sync", name, ErrorKind::NotImplemented)),
    }
}

/// [`TruncateFile::truncate`] through the capability probe.
pub async fn truncate(file: &mut dyn File, size: u64) -> Result<()> {
    let name = file.name().to_owned();
    match file.as_truncate() {
        Some(capable) => capable.truncate(size).await,
        None => Err(path_error("truncate", name, ErrorKind::NotImplemented)),
    }
}

/// [`ChmodFile::chmod`] through the capability probe.
pub async fn chmod(file: &mut dyn File, mode: FileMode) -> Result<()> {
    let name = file.name().to_owned();
    match file.as_chmod() {
        Some(capable) => capable.chmod(mode).await,
        None => Err(path_error("chmod", name, ErrorKind::NotImplemented)),
    }
}

/// [`ChownFile::chown`] through the capability probe.
pub async fn chown(file: &mut dyn File, uid: u32, gid: u32) -> Result<()> {
    let name = file.name().to_owned();
    match file.as_chown() {
        Some(capable) => capable.chown(uid, gid).await,
        None => Err(path_error("chown", name, ErrorKind::NotImplemented)),
    }
}

/// [`ChtimesFile::chtimes`] through the capability probe.
pub async fn chtimes(
    file: &mut dyn File,
    atime: Option<SystemTime>,
    mtime: Option<SystemTime>,
) -> Result<()> {
    let name = file.name().to_owned();
    match file.as_chtimes() {
        Some(capable) => capable.chtimes(atime, mtime).await,
        None => Err(path_error("chtimes", name, ErrorKind::NotImplemented)),
    }
}

/// Reads the handle to end of data, appending to `out`.
pub async fn read_to_end(file: &mut dyn File, out: &mut Vec<u8>) -> Result<usize> {
    let mut chunk = vec![0u8; 32 * 1024];
    let mut total = 0;
    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            return Ok(total);
        }
        out.extend_from_slice(&chunk[..n]);
        total += n;
    }
}

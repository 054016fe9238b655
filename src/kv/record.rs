//! Record wrappers used by the key-value filesystem engine.

use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::blob::{Blob, HeapBlob};
use crate::error::{ErrorKind, FsError, Result};
use crate::fs::{FileInfo, FileMode};
use crate::path;
use crate::store::Record;

/// Memoizing wrapper around a store record.
///
/// The engine owns the initialize-on-first-read cells, so each accessor of
/// the underlying record runs at most once per record lifetime regardless
/// of how often the engine consults it.
pub(crate) struct CachedRecord {
    inner: Arc<dyn Record>,
    size: OnceLock<u64>,
    mode: OnceLock<FileMode>,
    modtime: OnceLock<SystemTime>,
    names: OnceCell<Vec<String>>,
}

impl CachedRecord {
    pub fn new(inner: Arc<dyn Record>) -> CachedRecord {
        CachedRecord {
            inner,
            size: OnceLock::new(),
            mode: OnceLock::new(),
            modtime: OnceLock::new(),
            names: OnceCell::new(),
        }
    }

    pub fn size(&self) -> u64 {
        *self.size.get_or_init(|| self.inner.size())
    }

    pub fn mode(&self) -> FileMode {
        *self.mode.get_or_init(|| self.inner.mode())
    }

    pub fn modtime(&self) -> SystemTime {
        *self.modtime.get_or_init(|| self.inner.modtime())
    }

    pub fn is_dir(&self) -> bool {
        self.mode().is_dir()
    }

    /// The record's byte container. The engine calls this once, when a
    /// file handle is opened.
    pub async fn data(&self) -> Result<Box<dyn Blob>> {
        self.inner.data().await
    }

    pub async fn read_dir_names(&self) -> Result<Vec<String>> {
        let names = self.names.get_or_try_init(|| self.inner.read_dir_names()).await?;
        Ok(names.clone())
    }

    pub fn info(&self, full_path: &str) -> FileInfo {
        FileInfo {
            name: path::base(full_path).to_owned(),
            size: self.size(),
            mode: self.mode(),
            modtime: self.modtime(),
            sys: self.inner.sys(),
        }
    }
}

/// File record the engine hands to `Store::set`.
pub struct FileRecord {
    bytes: Arc<Vec<u8>>,
    mode: FileMode,
    modtime: SystemTime,
}

impl FileRecord {
    pub fn new(bytes: Vec<u8>, mode: FileMode, modtime: SystemTime) -> FileRecord {
        FileRecord { bytes: Arc::new(bytes), mode, modtime }
    }

    /// The record's contents without going through a blob copy.
    pub fn contents(&self) -> Arc<Vec<u8>> {
        self.bytes.clone()
    }
}

#[async_trait]
impl Record for FileRecord {
    async fn data(&self) -> Result<Box<dyn Blob>> {
        Ok(Box::new(HeapBlob::from(self.bytes.as_slice())))
    }

    async fn read_dir_names(&self) -> Result<Vec<String>> {
        Err(FsError::Kind(ErrorKind::NotDir))
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn mode(&self) -> FileMode {
        self.mode
    }

    fn modtime(&self) -> SystemTime {
        self.modtime
    }
}

/// Directory record the engine hands to `Store::set`.
///
/// Membership lives in the store's key space, so the record itself lists
/// no children.
pub struct DirRecord {
    mode: FileMode,
    modtime: SystemTime,
}

impl DirRecord {
    pub fn new(perm: FileMode, modtime: SystemTime) -> DirRecord {
        DirRecord { mode: FileMode::DIR | perm.perm(), modtime }
    }

    pub(crate) fn with_mode(mode: FileMode, modtime: SystemTime) -> DirRecord {
        DirRecord { mode: FileMode::DIR | (mode & !FileMode::TYPE_MASK), modtime }
    }
}

#[async_trait]
impl Record for DirRecord {
    async fn data(&self) -> Result<Box<dyn Blob>> {
        Err(FsError::Kind(ErrorKind::IsDir))
    }

    async fn read_dir_names(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn size(&self) -> u64 {
        0
    }

    fn mode(&self) -> FileMode {
        self.mode
    }

    fn modtime(&self) -> SystemTime {
        self.modtime
    }
}

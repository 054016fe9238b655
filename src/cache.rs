//! Read-only pull-through cache --- [`CacheFs`].
//!
//! Wraps a source filesystem and a writable cache filesystem. The first
//! open of a file copies it from source to cache under a per-path lock;
//! later opens are served from the cache. Directory listings always come
//! from the source, and stat results are memoized on the assumption that
//! the source never changes.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{path_error, ErrorKind, Result};
use crate::fs::file::{self, File};
use crate::fs::{dispatch, DirEntry, FileInfo, FileMode, Fs, OpenFileFs, OpenFlags, ReadDirFs, StatFs};
use crate::path;

const COPY_CHUNK: usize = 32 * 1024;

/// Predicate deciding whether a file is worth keeping in the cache.
pub type RetainFn = dyn Fn(&str, &FileInfo) -> bool + Send + Sync;

/// Options for [`CacheFs::new`].
#[derive(Clone, Default)]
pub struct CacheOptions {
    retain: Option<Arc<RetainFn>>,
}

impl CacheOptions {
    /// Installs a retain predicate; files it rejects are served straight
    /// from the source without being copied. The default keeps
    /// everything.
    pub fn retain(mut self, predicate: impl Fn(&str, &FileInfo) -> bool + Send + Sync + 'static) -> Self {
        self.retain = Some(Arc::new(predicate));
        self
    }
}

/// Read-only filesystem mirroring a source into a writable cache on
/// first access.
pub struct CacheFs {
    source: Arc<dyn Fs>,
    cache: Arc<dyn Fs>,
    stats: moka::sync::Cache<String, FileInfo>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    retain: Option<Arc<RetainFn>>,
}

impl CacheFs {
    pub fn new(source: Arc<dyn Fs>, cache: Arc<dyn Fs>, options: CacheOptions) -> CacheFs {
        CacheFs {
            source,
            cache,
            stats: moka::sync::Cache::new(1 << 20),
            locks: DashMap::new(),
            retain: options.retain,
        }
    }

    fn path_lock(&self, name: &str) -> Arc<Mutex<()>> {
        // Entries are never removed; the map is bounded by the set of
        // distinct paths touched.
        let entry = self
            .locks
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    async fn stat_memoized(&self, name: &str) -> Result<FileInfo> {
        if let Some(info) = self.stats.get(name) {
            return Ok(info);
        }
        let info = dispatch::stat(self.source.as_ref(), name).await?;
        self.stats.insert(name.to_owned(), info.clone());
        Ok(info)
    }

    async fn copy_to_cache(
        &self,
        name: &str,
        info: &FileInfo,
        source_handle: &mut Box<dyn File>,
    ) -> Result<()> {
        dispatch::mkdir_all(self.cache.as_ref(), path::parent(name), FileMode::new(0o755))
            .await?;
        let flags = OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE;
        let mut destination =
            dispatch::open_file(self.cache.as_ref(), name, flags, info.mode.perm()).await?;

        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let read = match source_handle.read(&mut buf).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) => {
                    let _ = destination.close().await;
                    return Err(err);
                }
            };
            if let Err(err) = file::write(destination.as_mut(), &buf[..read]).await {
                let _ = destination.close().await;
                return Err(err);
            }
        }
        destination.close().await?;
        debug!(name, size = info.size, "copied into cache");
        Ok(())
    }
}

#[async_trait]
impl Fs for CacheFs {
    async fn open(&self, name: &str) -> Result<Box<dyn File>> {
        if !path::valid(name) {
            return Err(path_error("open", name, ErrorKind::Invalid));
        }
        let info = self.stat_memoized(name).await?;
        if info.is_dir() {
            // Directory handles read their entries from the source.
            return dispatch::open(self.source.as_ref(), name).await;
        }

        let lock = self.path_lock(name);
        let _guard = lock.lock().await;

        if dispatch::stat(self.cache.as_ref(), name).await.is_ok() {
            return dispatch::open(self.cache.as_ref(), name).await;
        }

        let mut source_handle = dispatch::open(self.source.as_ref(), name).await?;
        if let Some(retain) = &self.retain {
            if !retain(name, &info) {
                return Ok(source_handle);
            }
        }
        self.copy_to_cache(name, &info, &mut source_handle).await?;

        // Hand the (now fully read) source handle back rewound; a handle
        // that cannot seek is replaced by the cached copy.
        match file::seek(source_handle.as_mut(), SeekFrom::Start(0)).await {
            Ok(_) => Ok(source_handle),
            Err(_) => {
                let _ = source_handle.close().await;
                dispatch::open(self.cache.as_ref(), name).await
            }
        }
    }

    fn as_open_file(&self) -> Option<&dyn OpenFileFs> {
        Some(self)
    }

    fn as_read_dir(&self) -> Option<&dyn ReadDirFs> {
        Some(self)
    }

    fn as_stat(&self) -> Option<&dyn StatFs> {
        Some(self)
    }
}

#[async_trait]
impl OpenFileFs for CacheFs {
    async fn open_file(
        &self,
        name: &str,
        flags: OpenFlags,
        _perm: FileMode,
    ) -> Result<Box<dyn File>> {
        if flags != OpenFlags::READ_ONLY {
            return Err(path_error("open", name, ErrorKind::Permission));
        }
        self.open(name).await
    }
}

#[async_trait]
impl ReadDirFs for CacheFs {
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        dispatch::read_dir(self.source.as_ref(), name).await
    }
}

#[async_trait]
impl StatFs for CacheFs {
    async fn stat(&self, name: &str) -> Result<FileInfo> {
        if !path::valid(name) {
            return Err(path_error("stat", name, ErrorKind::Invalid));
        }
        self.stat_memoized(name).await
    }
}

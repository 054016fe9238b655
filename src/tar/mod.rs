//! Read-only filesystem over a streaming tar archive --- [`TarFs`].
//!
//! Construction returns immediately; a background task unpacks the
//! archive into a writable unarchive filesystem (a fresh in-memory one by
//! default). Opening a file blocks until that file has been unpacked,
//! unpacking finishes, or unpacking fails. Directory listings wait for
//! the whole archive, since tar entry order cannot guarantee a directory
//! is complete any earlier.

mod header;
mod pool;
mod ready;
mod unpack;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::cancel;
use crate::error::{path_error, ErrorKind, FsError, Result};
use crate::fs::{dispatch, DirEntry, File, FileInfo, Fs, ReadDirFs, ReadFileFs, StatFs};
use crate::path;

use pool::BufferPool;
use unpack::{Unpacker, UnpackState};

/// Options for [`TarFs::new`].
pub struct TarOptions {
    /// Writable filesystem receiving the unpacked entries. Defaults to a
    /// fresh in-memory filesystem.
    pub unarchive_into: Option<Arc<dyn Fs>>,
    /// Cancellation observed for the whole unarchive lifetime.
    pub cancel: Option<cancel::Token>,
    /// Size of each small buffer; whole entries that fit one are written
    /// out by background tasks.
    pub small_buffer_size: usize,
    /// Number of small buffers.
    pub small_buffer_count: usize,
    /// Size of each large buffer, used for inline copies of big entries.
    pub large_buffer_size: usize,
    /// Number of large buffers.
    pub large_buffer_count: usize,
}

impl Default for TarOptions {
    // Small pool of many small buffers plus a big pool of a few large
    // ones; 20 MiB in total.
    fn default() -> TarOptions {
        TarOptions {
            unarchive_into: None,
            cancel: None,
            small_buffer_size: 32 * 1024,
            small_buffer_count: 64,
            large_buffer_size: 6 * 1024 * 1024,
            large_buffer_count: 3,
        }
    }
}

/// Read-only view of a tar archive being unpacked in the background.
pub struct TarFs {
    backing: Arc<dyn Fs>,
    state: Arc<UnpackState>,
}

impl TarFs {
    /// Starts unpacking `reader` and returns without waiting for it.
    pub async fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        options: TarOptions,
    ) -> Result<TarFs> {
        let backing: Arc<dyn Fs> = match options.unarchive_into {
            Some(backing) => backing,
            None => Arc::new(crate::mem::new_fs().await?),
        };
        let token = options.cancel.unwrap_or_else(cancel::Token::background);
        let state = Arc::new(UnpackState::new(token));
        let small = BufferPool::new(options.small_buffer_size, options.small_buffer_count);
        let large = BufferPool::new(options.large_buffer_size, options.large_buffer_count);
        Unpacker::spawn(reader, backing.clone(), state.clone(), small, large);
        Ok(TarFs { backing, state })
    }

    /// Resolves once the archive has been fully unpacked or unpacking
    /// has failed.
    pub async fn done(&self) {
        self.state.wait_done().await;
    }

    /// True once unpacking has finished, successfully or not.
    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// The first terminal unarchive error, if unpacking failed.
    pub fn unarchive_err(&self) -> Option<FsError> {
        self.state.error()
    }

    /// Waits until `key` is ready or unpacking has settled. Returns the
    /// terminal error to report if the path never became ready.
    async fn await_path(&self, op: &'static str, name: &str) -> Result<()> {
        let key = path::clean(name);
        loop {
            if self.state.ready.is_emitted(&key) {
                return Ok(());
            }
            if self.state.is_done() {
                return match self.state.error() {
                    Some(err) => Err(err.with_path(op, name)),
                    // Fully unpacked: the backing filesystem now answers
                    // authoritatively, including with NotExist.
                    None => Ok(()),
                };
            }
            tokio::select! {
                _ = self.state.ready.wait(&key) => {}
                _ = self.state.wait_done() => {}
                _ = self.state.token.cancelled() => {
                    return Err(path_error(op, name, ErrorKind::Canceled));
                }
            }
        }
    }

    /// Waits for the archive to be fully unpacked.
    async fn await_done(&self, op: &'static str, name: &str) -> Result<()> {
        tokio::select! {
            _ = self.state.wait_done() => {}
            _ = self.state.token.cancelled() => {
                return Err(path_error(op, name, ErrorKind::Canceled));
            }
        }
        match self.state.error() {
            Some(err) => Err(err.with_path(op, name)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Fs for TarFs {
    async fn open(&self, name: &str) -> Result<Box<dyn File>> {
        if !path::valid(name) {
            return Err(path_error("open", name, ErrorKind::Invalid));
        }
        self.await_path("open", name).await?;
        dispatch::open(self.backing.as_ref(), name).await
    }

    fn as_read_dir(&self) -> Option<&dyn ReadDirFs> {
        Some(self)
    }

    fn as_stat(&self) -> Option<&dyn StatFs> {
        Some(self)
    }

    fn as_read_file(&self) -> Option<&dyn ReadFileFs> {
        Some(self)
    }
}

#[async_trait]
impl ReadDirFs for TarFs {
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        if !path::valid(name) {
            return Err(path_error("readdir", name, ErrorKind::Invalid));
        }
        self.await_done("readdir", name).await?;
        dispatch::read_dir(self.backing.as_ref(), name).await
    }
}

#[async_trait]
impl StatFs for TarFs {
    async fn stat(&self, name: &str) -> Result<FileInfo> {
        if !path::valid(name) {
            return Err(path_error("stat", name, ErrorKind::Invalid));
        }
        self.await_path("stat", name).await?;
        dispatch::stat(self.backing.as_ref(), name).await
    }
}

#[async_trait]
impl ReadFileFs for TarFs {
    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        if !path::valid(name) {
            return Err(path_error("open", name, ErrorKind::Invalid));
        }
        self.await_path("open", name).await?;
        dispatch::read_file(self.backing.as_ref(), name).await
    }
}

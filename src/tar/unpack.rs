//! Background unpacking of a tar stream into the unarchive filesystem.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cancel;
use crate::error::{ErrorKind, FsError, Result};
use crate::fs::{dispatch, FileMode, Fs, OpenFlags};
use crate::fs::file as file_ops;
use crate::path;
use crate::tar::header::{self, EntryKind, Header, BLOCK_SIZE};
use crate::tar::pool::BufferPool;
use crate::tar::ready::ReadyBus;

/// State shared between the unpacker, its background writers, and the
/// filesystem surface.
pub(crate) struct UnpackState {
    pub ready: ReadyBus,
    pub token: cancel::Token,
    done_tx: watch::Sender<bool>,
    error: OnceLock<Arc<FsError>>,
}

impl UnpackState {
    pub fn new(token: cancel::Token) -> UnpackState {
        UnpackState {
            ready: ReadyBus::new(),
            token,
            done_tx: watch::channel(false).0,
            error: OnceLock::new(),
        }
    }

    /// Records the first terminal error and releases blocked waiters.
    pub fn fail(&self, err: FsError) {
        warn!(error = %err, "unarchive failed");
        let _ = self.error.set(Arc::new(err));
        self.done_tx.send_replace(true);
    }

    pub fn finish(&self) {
        self.done_tx.send_replace(true);
    }

    pub fn is_done(&self) -> bool {
        *self.done_tx.borrow()
    }

    pub fn error(&self) -> Option<FsError> {
        self.error.get().map(|shared| FsError::Shared(shared.clone()))
    }

    pub async fn wait_done(&self) {
        let mut receiver = self.done_tx.subscribe();
        let _ = receiver.wait_for(|done| *done).await;
    }
}

pub(crate) struct Unpacker<R> {
    reader: R,
    backing: Arc<dyn Fs>,
    state: Arc<UnpackState>,
    small: Arc<BufferPool>,
    large: Arc<BufferPool>,
    made_dirs: HashSet<String>,
    writers: JoinSet<()>,
}

impl<R: AsyncRead + Send + Unpin + 'static> Unpacker<R> {
    pub fn spawn(
        reader: R,
        backing: Arc<dyn Fs>,
        state: Arc<UnpackState>,
        small: Arc<BufferPool>,
        large: Arc<BufferPool>,
    ) {
        let unpacker = Unpacker {
            reader,
            backing,
            state,
            small,
            large,
            made_dirs: HashSet::new(),
            writers: JoinSet::new(),
        };
        tokio::spawn(unpacker.run());
    }

    async fn run(mut self) {
        let outcome = self.unpack().await;
        // Background writers must settle before completion is reported;
        // they record their own failures into the shared state.
        while self.writers.join_next().await.is_some() {}
        match outcome {
            Ok(()) => {
                debug!("unarchive complete");
                self.state.finish();
            }
            Err(err) => self.state.fail(err),
        }
        // Dropping the reader releases the underlying source.
        drop(self.reader);
    }

    async fn unpack(&mut self) -> Result<()> {
        let mut long_name: Option<String> = None;
        let mut saw_zero_block = false;

        loop {
            if self.state.token.is_cancelled() {
                return Err(self.state.token.error());
            }
            let mut block = [0u8; BLOCK_SIZE];
            if !self.read_block(&mut block).await? {
                return Ok(());
            }
            let header = match header::parse(&block)? {
                Some(header) => {
                    saw_zero_block = false;
                    header
                }
                None if saw_zero_block => return Ok(()),
                None => {
                    saw_zero_block = true;
                    continue;
                }
            };

            match header.kind {
                EntryKind::LongName => {
                    long_name = Some(self.read_long_name(&header).await?);
                }
                EntryKind::PaxExtended | EntryKind::Other => {
                    self.discard(header.size + header.padding()).await?;
                }
                EntryKind::Dir => {
                    let raw = long_name.take().unwrap_or_else(|| header.name.clone());
                    self.discard(header.size + header.padding()).await?;
                    let target = path::clean(&raw);
                    if target != path::ROOT {
                        // Ancestors are created inline so the spawned
                        // leaf mkdir cannot race against them.
                        self.ensure_parent(&target).await?;
                        self.spawn_mkdir(target, FileMode::new(header.mode));
                    }
                }
                EntryKind::File => {
                    let raw = long_name.take().unwrap_or_else(|| header.name.clone());
                    let target = path::clean(&raw);
                    if target == path::ROOT {
                        self.discard(header.size + header.padding()).await?;
                        continue;
                    }
                    self.ensure_parent(&target).await?;
                    self.write_entry(&header, target).await?;
                }
            }
        }
    }

    /// Reads one block. Returns `false` on a clean end of stream.
    async fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> Result<bool> {
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            let read = self.reader.read(&mut block[filled..]).await?;
            if read == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(FsError::Backend("truncated tar header block".into()));
            }
            filled += read;
        }
        Ok(true)
    }

    async fn read_long_name(&mut self, header: &Header) -> Result<String> {
        let mut raw = vec![0u8; header.size as usize];
        self.reader.read_exact(&mut raw).await?;
        self.discard(header.padding()).await?;
        let end = raw.iter().position(|byte| *byte == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    async fn discard(&mut self, mut remaining: u64) -> Result<()> {
        let mut chunk = [0u8; BLOCK_SIZE];
        while remaining > 0 {
            let want = remaining.min(BLOCK_SIZE as u64) as usize;
            let read = self.reader.read(&mut chunk[..want]).await?;
            if read == 0 {
                return Err(FsError::Backend("truncated tar entry".into()));
            }
            remaining -= read as u64;
        }
        Ok(())
    }

    async fn ensure_parent(&mut self, target: &str) -> Result<()> {
        let parent = path::parent(target);
        if parent == path::ROOT || self.made_dirs.contains(parent) {
            return Ok(());
        }
        dispatch::mkdir_all(self.backing.as_ref(), parent, FileMode::new(0o755)).await?;
        for prefix in path::prefixes(parent) {
            self.made_dirs.insert(prefix.to_owned());
        }
        Ok(())
    }

    fn spawn_mkdir(&mut self, target: String, mode: FileMode) {
        let backing = self.backing.clone();
        let state = self.state.clone();
        self.writers.spawn(async move {
            let outcome = match dispatch::mkdir(backing.as_ref(), &target, mode.perm()).await {
                Err(err) if err.is(ErrorKind::Exist) => {
                    dispatch::chmod(backing.as_ref(), &target, mode.perm()).await
                }
                other => other,
            };
            if let Err(err) = outcome {
                state.fail(err);
            }
        });
    }

    async fn write_entry(&mut self, header: &Header, target: String) -> Result<()> {
        let size = header.size;
        let mode = FileMode::new(header.mode);
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(header.mtime);

        let mut first = self.small.acquire().await;
        let head_len = (size as usize).min(first.len());
        self.reader.read_exact(&mut first[..head_len]).await?;

        if size <= self.small.buffer_size() as u64 {
            // The whole entry fits one small buffer: hand the write to a
            // background task so the reader can advance.
            self.discard(header.padding()).await?;
            let backing = self.backing.clone();
            let state = self.state.clone();
            self.writers.spawn(async move {
                let write = write_file(
                    backing.as_ref(),
                    &target,
                    &first[..head_len],
                    mode,
                    mtime,
                )
                .await;
                match write {
                    Ok(()) => state.ready.emit(&target),
                    Err(err) => state.fail(err),
                }
            });
            return Ok(());
        }

        // Larger than a small buffer: the tar cursor cannot advance past
        // this entry until its data is consumed, so finish the copy
        // inline through a large buffer.
        let flags = OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE;
        let mut destination =
            dispatch::open_file(self.backing.as_ref(), &target, flags, mode.perm()).await?;
        file_ops::write(destination.as_mut(), &first[..head_len]).await?;
        drop(first);

        let mut remaining = size - head_len as u64;
        let mut big = self.large.acquire().await;
        while remaining > 0 {
            if self.state.token.is_cancelled() {
                let _ = destination.close().await;
                return Err(self.state.token.error());
            }
            let want = remaining.min(big.len() as u64) as usize;
            let read = self.reader.read(&mut big[..want]).await?;
            if read == 0 {
                let _ = destination.close().await;
                return Err(FsError::Backend("truncated tar entry".into()));
            }
            file_ops::write(destination.as_mut(), &big[..read]).await?;
            remaining -= read as u64;
        }
        drop(big);
        destination.close().await?;
        self.discard(header.padding()).await?;

        apply_times(self.backing.as_ref(), &target, mtime).await?;
        self.state.ready.emit(&target);
        Ok(())
    }
}

async fn write_file(
    backing: &dyn Fs,
    target: &str,
    contents: &[u8],
    mode: FileMode,
    mtime: SystemTime,
) -> Result<()> {
    let flags = OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE;
    let mut handle = dispatch::open_file(backing, target, flags, mode.perm()).await?;
    if !contents.is_empty() {
        file_ops::write(handle.as_mut(), contents).await?;
    }
    handle.close().await?;
    apply_times(backing, target, mtime).await
}

async fn apply_times(backing: &dyn Fs, target: &str, mtime: SystemTime) -> Result<()> {
    match dispatch::chtimes(backing, target, None, Some(mtime)).await {
        Err(err) if err.is(ErrorKind::NotImplemented) => Ok(()),
        other => other,
    }
}

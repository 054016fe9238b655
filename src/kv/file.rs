//! File handles for the key-value filesystem engine.

use std::io::SeekFrom;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::blob::{self, Blob};
use crate::error::{path_error, ErrorKind, Result};
use crate::fs::file::{
    ChmodFile, ChtimesFile, File, ReadAtFile, ReadDirFile, SeekFile, SyncFile, TruncateFile,
    WriteAtFile, WriteFile,
};
use crate::fs::{DirEntry, FileInfo, FileMode, OpenFlags};
use crate::kv::record::{DirRecord, FileRecord};
use crate::kv::KvFs;
use crate::path;
use crate::store::Record;

pub(crate) enum Content {
    File(Box<dyn Blob>),
    Dir,
}

/// Read-write handle over one record.
///
/// The handle owns a materialized copy of the record's contents; every
/// mutation is written back to the store, so reopened handles observe it.
pub(crate) struct KvFile {
    fs: KvFs,
    full_path: String,
    flags: OpenFlags,
    content: Content,
    mode: FileMode,
    modtime: SystemTime,
    cursor: u64,
    dir_names: Option<Vec<String>>,
    dir_cursor: usize,
    closed: bool,
}

impl KvFile {
    pub fn new(
        fs: KvFs,
        full_path: String,
        flags: OpenFlags,
        content: Content,
        mode: FileMode,
        modtime: SystemTime,
    ) -> KvFile {
        KvFile {
            fs,
            full_path,
            flags,
            content,
            mode,
            modtime,
            cursor: 0,
            dir_names: None,
            dir_cursor: 0,
            closed: false,
        }
    }

    fn check_open(&self, op: &'static str) -> Result<()> {
        if self.closed {
            return Err(path_error(op, &self.full_path, ErrorKind::Closed));
        }
        Ok(())
    }

    fn data_len(&self) -> u64 {
        match &self.content {
            Content::File(data) => data.len() as u64,
            Content::Dir => 0,
        }
    }

    async fn save(&self, op: &'static str) -> Result<()> {
        let record: std::sync::Arc<dyn Record> = match &self.content {
            Content::File(data) => std::sync::Arc::new(FileRecord::new(
                data.bytes().to_vec(),
                self.mode,
                self.modtime,
            )),
            Content::Dir => {
                std::sync::Arc::new(DirRecord::with_mode(self.mode, self.modtime))
            }
        };
        self.fs
            .store()
            .set(&self.full_path, Some(record))
            .await
            .map_err(|err| err.with_path(op, &self.full_path))
    }

    fn read_at_impl(&self, op: &'static str, buf: &mut [u8], off: u64) -> Result<usize> {
        let data = match &self.content {
            Content::File(data) => data,
            Content::Dir => return Err(path_error(op, &self.full_path, ErrorKind::IsDir)),
        };
        let len = data.len() as u64;
        if off >= len {
            return Ok(0);
        }
        let end = len.min(off + buf.len() as u64);
        let chunk = &data.bytes()[off as usize..end as usize];
        buf[..chunk.len()].copy_from_slice(chunk);
        Ok(chunk.len())
    }

    async fn write_at_impl(&mut self, op: &'static str, buf: &[u8], off: u64) -> Result<usize> {
        let data = match &mut self.content {
            Content::File(data) => data,
            Content::Dir => return Err(path_error(op, &self.full_path, ErrorKind::IsDir)),
        };
        if buf.is_empty() {
            return Ok(0);
        }
        let len = data.len() as u64;
        let end = off + buf.len() as u64;
        if end > len {
            blob::grow(data, end - len).map_err(|err| err.with_path(op, &self.full_path))?;
        }
        let written =
            blob::set(data, buf, off).map_err(|err| err.with_path(op, &self.full_path))?;
        if written > 0 {
            self.modtime = SystemTime::now();
        }
        self.save(op).await?;
        Ok(written)
    }
}

#[async_trait]
impl File for KvFile {
    fn name(&self) -> &str {
        &self.full_path
    }

    async fn stat(&self) -> Result<FileInfo> {
        self.check_open("stat")?;
        Ok(FileInfo {
            name: path::base(&self.full_path).to_owned(),
            size: self.data_len(),
            mode: self.mode,
            modtime: self.modtime,
            sys: None,
        })
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_open("read")?;
        let n = self.read_at_impl("read", buf, self.cursor)?;
        self.cursor += n as u64;
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.check_open("close")?;
        self.closed = true;
        Ok(())
    }

    fn as_write(&mut self) -> Option<&mut dyn WriteFile> {
        Some(self)
    }

    fn as_read_at(&self) -> Option<&dyn ReadAtFile> {
        Some(self)
    }

    fn as_write_at(&mut self) -> Option<&mut dyn WriteAtFile> {
        Some(self)
    }

    fn as_seek(&mut self) -> Option<&mut dyn SeekFile> {
        Some(self)
    }

    fn as_read_dir(&mut self) -> Option<&mut dyn ReadDirFile> {
        Some(self)
    }

    fn as_sync(&mut self) -> Option<&mut dyn SyncFile> {
        Some(self)
    }

    fn as_truncate(&mut self) -> Option<&mut dyn TruncateFile> {
        Some(self)
    }

    fn as_chmod(&mut self) -> Option<&mut dyn ChmodFile> {
        Some(self)
    }

    fn as_chtimes(&mut self) -> Option<&mut dyn ChtimesFile> {
        Some(self)
    }
}

#[async_trait]
impl WriteFile for KvFile {
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_open("write")?;
        let off = if self.flags.contains(OpenFlags::APPEND) { self.data_len() } else { self.cursor };
        let written = self.write_at_impl("write", buf, off).await?;
        self.cursor = off + written as u64;
        Ok(written)
    }
}

#[async_trait]
impl ReadAtFile for KvFile {
    async fn read_at(&self, buf: &mut [u8], off: u64) -> Result<usize> {
        self.check_open("readat")?;
        self.read_at_impl("readat", buf, off)
    }
}

#[async_trait]
impl WriteAtFile for KvFile {
    async fn write_at(&mut self, buf: &[u8], off: u64) -> Result<usize> {
        self.check_open("writeat")?;
        self.write_at_impl("writeat", buf, off).await
    }
}

#[async_trait]
impl SeekFile for KvFile {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_open("seek")?;
        let target = match pos {
            SeekFrom::Start(off) => off as i64,
            SeekFrom::Current(delta) => self.cursor as i64 + delta,
            SeekFrom::End(delta) => self.data_len() as i64 + delta,
        };
        if target < 0 {
            return Err(path_error("seek", &self.full_path, ErrorKind::Invalid));
        }
        self.cursor = target as u64;
        Ok(self.cursor)
    }
}

#[async_trait]
impl ReadDirFile for KvFile {
    async fn read_dir(&mut self, n: isize) -> Result<Vec<DirEntry>> {
        self.check_open("readdir")?;
        if !matches!(self.content, Content::Dir) {
            return Err(path_error("readdir", &self.full_path, ErrorKind::NotDir));
        }
        if self.dir_names.is_none() {
            let mut names = self
                .fs
                .directory_names(&self.full_path)
                .await
                .map_err(|err| err.with_path("readdir", &self.full_path))?;
            names.sort();
            self.dir_names = Some(names);
        }
        let names = self.dir_names.get_or_insert_with(Vec::new);
        let remaining = names.len().saturating_sub(self.dir_cursor);
        let take = if n <= 0 { remaining } else { remaining.min(n as usize) };
        let selected: Vec<String> = names[self.dir_cursor..self.dir_cursor + take].to_vec();
        self.dir_cursor += take;

        let mut entries = Vec::with_capacity(selected.len());
        for name in selected {
            let full = path::join(&self.full_path, &name);
            let is_dir = match self.fs.record_is_dir(&full).await {
                Ok(is_dir) => is_dir,
                // Lost a race with a concurrent remove; drop the entry.
                Err(err) if err.is(ErrorKind::NotExist) => continue,
                Err(err) => return Err(err.with_path("readdir", &self.full_path)),
            };
            entries.push(DirEntry::with_origin(
                name,
                is_dir,
                std::sync::Arc::new(self.fs.clone()),
                full,
            ));
        }
        Ok(entries)
    }
}

#[async_trait]
impl SyncFile for KvFile {
    async fn sync(&mut self) -> Result<()> {
        self.check_open("sync")?;
        self.save("sync").await
    }
}

#[async_trait]
impl TruncateFile for KvFile {
    async fn truncate(&mut self, size: u64) -> Result<()> {
        self.check_open("truncate")?;
        let data = match &mut self.content {
            Content::File(data) => data,
            Content::Dir => {
                return Err(path_error("truncate", &self.full_path, ErrorKind::IsDir))
            }
        };
        let len = data.len() as u64;
        if size < len {
            blob::truncate(data, size)
                .map_err(|err| err.with_path("truncate", &self.full_path))?;
        } else if size > len {
            blob::grow(data, size - len)
                .map_err(|err| err.with_path("truncate", &self.full_path))?;
        }
        self.modtime = SystemTime::now();
        self.save("truncate").await
    }
}

#[async_trait]
impl ChmodFile for KvFile {
    async fn chmod(&mut self, mode: FileMode) -> Result<()> {
        self.check_open("chmod")?;
        self.mode = self.mode.chmod(mode);
        self.save("chmod").await
    }
}

#[async_trait]
impl ChtimesFile for KvFile {
    async fn chtimes(
        &mut self,
        _atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Result<()> {
        self.check_open("chtimes")?;
        if let Some(mtime) = mtime {
            self.modtime = mtime;
        }
        self.save("chtimes").await
    }
}

/// Facade hiding the write capabilities of a handle opened read-only.
pub(crate) struct ReadOnlyFile(pub(crate) KvFile);

#[async_trait]
impl File for ReadOnlyFile {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn stat(&self) -> Result<FileInfo> {
        self.0.stat().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.0.read(buf).await
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await
    }

    fn as_read_at(&self) -> Option<&dyn ReadAtFile> {
        Some(&self.0)
    }

    fn as_seek(&mut self) -> Option<&mut dyn SeekFile> {
        Some(&mut self.0)
    }

    fn as_read_dir(&mut self) -> Option<&mut dyn ReadDirFile> {
        Some(&mut self.0)
    }

    fn as_sync(&mut self) -> Option<&mut dyn SyncFile> {
        Some(&mut self.0)
    }

    fn as_chmod(&mut self) -> Option<&mut dyn ChmodFile> {
        Some(&mut self.0)
    }

    fn as_chtimes(&mut self) -> Option<&mut dyn ChtimesFile> {
        Some(&mut self.0)
    }
}

/// Facade hiding the read capabilities of a handle opened write-only.
pub(crate) struct WriteOnlyFile(pub(crate) KvFile);

#[async_trait]
impl File for WriteOnlyFile {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn stat(&self) -> Result<FileInfo> {
        self.0.stat().await
    }

    async fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        self.0.check_open("read")?;
        Err(path_error("read", self.0.name().to_owned(), ErrorKind::Permission))
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await
    }

    fn as_write(&mut self) -> Option<&mut dyn WriteFile> {
        Some(&mut self.0)
    }

    fn as_write_at(&mut self) -> Option<&mut dyn WriteAtFile> {
        Some(&mut self.0)
    }

    fn as_seek(&mut self) -> Option<&mut dyn SeekFile> {
        Some(&mut self.0)
    }

    fn as_sync(&mut self) -> Option<&mut dyn SyncFile> {
        Some(&mut self.0)
    }

    fn as_truncate(&mut self) -> Option<&mut dyn TruncateFile> {
        Some(&mut self.0)
    }

    fn as_chmod(&mut self) -> Option<&mut dyn ChmodFile> {
        Some(&mut self.0)
    }

    fn as_chtimes(&mut self) -> Option<&mut dyn ChtimesFile> {
        Some(&mut self.0)
    }
}

//! A complete POSIX-like filesystem over a key-value [`Store`] ---
//! [`KvFs`].
//!
//! Every path is a store key holding one record; directory membership is
//! derived from the key space. The engine enforces the tree invariants
//! (parents exist and are directories, removals require empty targets,
//! the root always exists) and leans on store transactions where the
//! store offers them.

mod file;
mod record;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::cancel;
use crate::error::{link_error, path_error, ErrorKind, Result};
use crate::fs::{
    ChmodFs, ChtimesFs, CreateFs, File, FileInfo, FileMode, Fs, MkdirAllFs, MkdirFs, OpenFileFs,
    OpenFlags, ReadFileFs, RemoveAllFs, RemoveFs, RenameFs, StatFs,
};
use crate::path;
use crate::store::{transaction_or_serial, OpResult, Record, Store, TxMode, TxOptions};

use file::{Content, KvFile, ReadOnlyFile, WriteOnlyFile};
use record::CachedRecord;

pub use record::{DirRecord, FileRecord};

/// Filesystem engine over a key-value store.
#[derive(Clone)]
pub struct KvFs {
    store: Arc<dyn Store>,
}

impl KvFs {
    /// Wraps `store`, creating the root directory record if the store
    /// does not hold one yet.
    pub async fn new(store: Arc<dyn Store>) -> Result<KvFs> {
        let fs = KvFs { store };
        match fs.store.get(path::ROOT).await {
            Ok(_) => {}
            Err(err) if err.is(ErrorKind::NotExist) => {
                debug!("creating root directory record");
                let root = DirRecord::new(FileMode::new(0o755), SystemTime::now());
                fs.store
                    .set(path::ROOT, Some(Arc::new(root)))
                    .await
                    .map_err(|err| err.with_path("mkdir", path::ROOT))?;
            }
            Err(err) => return Err(err.with_path("open", path::ROOT)),
        }
        Ok(fs)
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn validate(op: &'static str, name: &str) -> Result<()> {
        if !path::valid(name) {
            return Err(path_error(op, name, ErrorKind::Invalid));
        }
        Ok(())
    }

    async fn record(&self, op: &'static str, name: &str) -> Result<CachedRecord> {
        let record = self.store.get(name).await.map_err(|err| err.with_path(op, name))?;
        Ok(CachedRecord::new(record))
    }

    pub(crate) async fn directory_names(&self, name: &str) -> Result<Vec<String>> {
        self.record("readdir", name).await?.read_dir_names().await
    }

    pub(crate) async fn record_is_dir(&self, name: &str) -> Result<bool> {
        Ok(self.record("stat", name).await?.is_dir())
    }

    async fn save_meta(
        &self,
        op: &'static str,
        name: &str,
        record: &CachedRecord,
        mode: FileMode,
        modtime: SystemTime,
    ) -> Result<()> {
        let saved: Arc<dyn Record> = if record.is_dir() {
            Arc::new(DirRecord::with_mode(mode, modtime))
        } else {
            let data = record.data().await.map_err(|err| err.with_path(op, name))?;
            Arc::new(FileRecord::new(data.bytes().to_vec(), mode, modtime))
        };
        self.store.set(name, Some(saved)).await.map_err(|err| err.with_path(op, name))
    }

    fn rename_inner<'a>(&'a self, old: &'a str, new: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let record = match self.store.get(old).await {
                Ok(record) => CachedRecord::new(record),
                Err(err) => return Err(err.with_link("rename", old, new)),
            };

            if !record.is_dir() {
                return self.rename_file(old, new, &record).await;
            }

            // Directory renames recreate the tree bottom-up and are not
            // atomic: a failure part-way leaves both trees partially
            // populated.
            match self.store.get(new).await {
                Ok(_) => return Err(link_error("rename", old, new, ErrorKind::Exist)),
                Err(err) if err.is(ErrorKind::NotExist) => {}
                Err(err) => return Err(err.with_link("rename", old, new)),
            }
            let created = DirRecord::with_mode(record.mode(), record.modtime());
            self.store
                .set(new, Some(Arc::new(created)))
                .await
                .map_err(|err| err.with_link("rename", old, new))?;
            let mut names =
                record.read_dir_names().await.map_err(|err| err.with_link("rename", old, new))?;
            names.sort();
            for name in names {
                let old_child = path::join(old, &name);
                let new_child = path::join(new, &name);
                self.rename_inner(&old_child, &new_child).await?;
            }
            self.store.set(old, None).await.map_err(|err| err.with_link("rename", old, new))
        })
    }

    async fn rename_file(&self, old: &str, new: &str, record: &CachedRecord) -> Result<()> {
        if old == new {
            return Ok(());
        }
        match self.store.get(new).await {
            Ok(existing) if existing.mode().is_dir() => {
                return Err(link_error("rename", old, new, ErrorKind::IsDir))
            }
            Ok(_) | Err(_) => {}
        }

        let data = record.data().await.map_err(|err| err.with_link("rename", old, new))?;
        let contents = data.bytes().to_vec();
        let moved = FileRecord::new(contents.clone(), record.mode(), record.modtime());

        let mut tx = transaction_or_serial(&self.store, TxOptions { mode: TxMode::ReadWrite })
            .await
            .map_err(|err| err.with_link("rename", old, new))?;
        let abort_on_error = || {
            Box::new(|result: &OpResult| {
                if result.ok() {
                    crate::store::TxDecision::Continue
                } else {
                    crate::store::TxDecision::Abort
                }
            })
        };
        tx.set_with(new, Some(Arc::new(moved)), Some(contents), abort_on_error()).await;
        tx.set_with(old, None, None, abort_on_error()).await;
        let results = tx
            .commit(cancel::Token::background())
            .await
            .map_err(|err| err.with_link("rename", old, new))?;
        for result in results {
            if let Some(err) = result.err {
                return Err(err.with_link("rename", old, new));
            }
        }
        Ok(())
    }

    fn remove_tree<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let record = match self.record("remove", name).await {
                Ok(record) => record,
                Err(err) if err.is(ErrorKind::NotExist) => return Ok(()),
                Err(err) => return Err(err),
            };
            if record.is_dir() {
                let children =
                    record.read_dir_names().await.map_err(|err| err.with_path("remove", name))?;
                for child in children {
                    let child_path = path::join(name, &child);
                    self.remove_tree(&child_path).await?;
                }
            }
            if name == path::ROOT {
                return Ok(());
            }
            self.store.set(name, None).await.map_err(|err| err.with_path("remove", name))
        })
    }
}

#[async_trait]
impl Fs for KvFs {
    async fn open(&self, name: &str) -> Result<Box<dyn File>> {
        self.open_file(name, OpenFlags::READ_ONLY, FileMode::new(0)).await
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

    fn as_remove(&self) -> Option<&dyn RemoveFs> {
        Some(self)
    }

    fn as_remove_all(&self) -> Option<&dyn RemoveAllFs> {
        Some(self)
    }

    fn as_rename(&self) -> Option<&dyn RenameFs> {
        Some(self)
    }

    fn as_stat(&self) -> Option<&dyn StatFs> {
        Some(self)
    }

    fn as_chmod(&self) -> Option<&dyn ChmodFs> {
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
impl OpenFileFs for KvFs {
    async fn open_file(
        &self,
        name: &str,
        flags: OpenFlags,
        perm: FileMode,
    ) -> Result<Box<dyn File>> {
        KvFs::validate("open", name)?;
        if flags.conflicting_access() {
            return Err(path_error("open", name, ErrorKind::Invalid));
        }

        let create = flags.contains(OpenFlags::CREATE);
        let parent = path::parent(name);

        // Fetch the target (and its parent when creating) in a single
        // transaction where the store supports one.
        let mut tx = transaction_or_serial(&self.store, TxOptions { mode: TxMode::ReadOnly })
            .await
            .map_err(|err| err.with_path("open", name))?;
        let target_op = tx.get(name).await;
        let parent_op = if create && name != path::ROOT { Some(tx.get(parent).await) } else { None };
        let results = tx
            .commit(cancel::Token::background())
            .await
            .map_err(|err| err.with_path("open", name))?;

        let take = |op: u64| results.iter().find(|result| result.op == op);
        let target = take(target_op);

        let record = match target {
            Some(result) if result.ok() => result.record.clone().map(CachedRecord::new),
            Some(result) => match &result.err {
                Some(err) if err.is(ErrorKind::NotExist) => None,
                Some(err) => {
                    return Err(path_error(
                        "open",
                        name,
                        err.kind().unwrap_or(ErrorKind::Io),
                    ))
                }
                None => None,
            },
            None => None,
        };

        let (content, mode, modtime) = match record {
            Some(record) => {
                if record.is_dir() {
                    if create || flags.contains(OpenFlags::WRITE_ONLY) {
                        return Err(path_error("open", name, ErrorKind::IsDir));
                    }
                    (Content::Dir, record.mode(), record.modtime())
                } else {
                    if create && flags.contains(OpenFlags::EXCLUSIVE) {
                        return Err(path_error("open", name, ErrorKind::Exist));
                    }
                    let data = record.data().await.map_err(|err| err.with_path("open", name))?;
                    (Content::File(data), record.mode(), record.modtime())
                }
            }
            None if create => {
                if let Some(parent_op) = parent_op {
                    match take(parent_op) {
                        Some(result) if result.ok() => {
                            let parent_record =
                                result.record.clone().map(CachedRecord::new);
                            match parent_record {
                                Some(parent_record) if parent_record.is_dir() => {}
                                Some(_) => {
                                    return Err(path_error("open", name, ErrorKind::NotDir))
                                }
                                None => {
                                    return Err(path_error("open", name, ErrorKind::NotExist))
                                }
                            }
                        }
                        _ => return Err(path_error("open", name, ErrorKind::NotExist)),
                    }
                }
                let mode = FileMode::REGULAR | perm.perm();
                let now = SystemTime::now();
                let created = FileRecord::new(Vec::new(), mode, now);
                self.store
                    .set(name, Some(Arc::new(created)))
                    .await
                    .map_err(|err| err.with_path("open", name))?;
                (Content::File(Box::new(crate::blob::HeapBlob::new())), mode, now)
            }
            None => return Err(path_error("open", name, ErrorKind::NotExist)),
        };

        let mut handle = KvFile::new(self.clone(), name.to_owned(), flags, content, mode, modtime);
        if flags.contains(OpenFlags::TRUNCATE) && flags.writable() {
            crate::fs::file::truncate(&mut handle, 0).await?;
        }

        Ok(if !flags.writable() {
            Box::new(ReadOnlyFile(handle))
        } else if !flags.readable() {
            Box::new(WriteOnlyFile(handle))
        } else {
            Box::new(handle)
        })
    }
}

#[async_trait]
impl CreateFs for KvFs {
    async fn create(&self, name: &str) -> Result<Box<dyn File>> {
        let flags = OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE;
        self.open_file(name, flags, FileMode::new(0o666)).await
    }
}

#[async_trait]
impl MkdirFs for KvFs {
    async fn mkdir(&self, name: &str, perm: FileMode) -> Result<()> {
        KvFs::validate("mkdir", name)?;
        if name != path::ROOT {
            let parent = path::parent(name);
            let parent_record = match self.record("mkdir", parent).await {
                Ok(record) => record,
                Err(err) if err.is(ErrorKind::NotExist) => {
                    return Err(path_error("mkdir", name, ErrorKind::NotExist))
                }
                Err(err) => return Err(err),
            };
            if !parent_record.is_dir() {
                return Err(path_error("mkdir", name, ErrorKind::NotDir));
            }
        }
        match self.store.get(name).await {
            Ok(_) => return Err(path_error("mkdir", name, ErrorKind::Exist)),
            Err(err) if err.is(ErrorKind::NotExist) => {}
            Err(err) => return Err(err.with_path("mkdir", name)),
        }
        let record = DirRecord::new(perm, SystemTime::now());
        self.store
            .set(name, Some(Arc::new(record)))
            .await
            .map_err(|err| err.with_path("mkdir", name))
    }
}

#[async_trait]
impl MkdirAllFs for KvFs {
    async fn mkdir_all(&self, target: &str, perm: FileMode) -> Result<()> {
        KvFs::validate("mkdir", target)?;
        if target == path::ROOT {
            return Ok(());
        }

        // Walk leaf to root collecting the missing suffix of the chain.
        let mut missing: Vec<&str> = Vec::new();
        let mut current = target;
        loop {
            match self.record("mkdir", current).await {
                Ok(record) => {
                    if !record.is_dir() {
                        return Err(path_error("mkdir", current.to_owned(), ErrorKind::NotDir));
                    }
                    break;
                }
                Err(err) if err.is(ErrorKind::NotExist) => {
                    missing.push(current);
                    if current == path::ROOT {
                        break;
                    }
                    current = path::parent(current);
                }
                Err(err) => return Err(err),
            }
        }

        for prefix in missing.into_iter().rev() {
            match self.mkdir(prefix, perm).await {
                Ok(()) => {}
                Err(err) if err.is(ErrorKind::Exist) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoveFs for KvFs {
    async fn remove(&self, name: &str) -> Result<()> {
        KvFs::validate("remove", name)?;
        if name == path::ROOT {
            return Err(path_error("remove", name, ErrorKind::Invalid));
        }
        let record = self.record("remove", name).await?;
        if record.is_dir() {
            let names =
                record.read_dir_names().await.map_err(|err| err.with_path("remove", name))?;
            if !names.is_empty() {
                return Err(path_error("remove", name, ErrorKind::NotEmpty));
            }
        }
        self.store.set(name, None).await.map_err(|err| err.with_path("remove", name))
    }
}

#[async_trait]
impl RemoveAllFs for KvFs {
    async fn remove_all(&self, name: &str) -> Result<()> {
        KvFs::validate("remove", name)?;
        self.remove_tree(name).await
    }
}

#[async_trait]
impl RenameFs for KvFs {
    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        if !path::valid(old) || !path::valid(new) {
            return Err(link_error("rename", old, new, ErrorKind::Invalid));
        }
        debug!(old, new, "rename");
        self.rename_inner(old, new).await
    }
}

#[async_trait]
impl StatFs for KvFs {
    async fn stat(&self, name: &str) -> Result<FileInfo> {
        KvFs::validate("stat", name)?;
        let record = self.record("stat", name).await?;
        Ok(record.info(name))
    }
}

#[async_trait]
impl ChmodFs for KvFs {
    async fn chmod(&self, name: &str, mode: FileMode) -> Result<()> {
        KvFs::validate("chmod", name)?;
        let record = self.record("chmod", name).await?;
        let changed = record.mode().chmod(mode);
        self.save_meta("chmod", name, &record, changed, record.modtime()).await
    }
}

#[async_trait]
impl ChtimesFs for KvFs {
    async fn chtimes(
        &self,
        name: &str,
        _atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Result<()> {
        KvFs::validate("chtimes", name)?;
        let record = self.record("chtimes", name).await?;
        let modtime = mtime.unwrap_or_else(|| record.modtime());
        self.save_meta("chtimes", name, &record, record.mode(), modtime).await
    }
}

#[async_trait]
impl ReadFileFs for KvFs {
    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        KvFs::validate("open", name)?;
        let record = self.record("open", name).await?;
        if record.is_dir() {
            return Err(path_error("open", name, ErrorKind::IsDir));
        }
        let data = record.data().await.map_err(|err| err.with_path("read", name))?;
        Ok(data.bytes().to_vec())
    }
}

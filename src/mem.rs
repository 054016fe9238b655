//! In-memory key-value store backend --- [`MemStore`].
//!
//! Records live in a process-wide concurrent map from canonical path to
//! entry. Contents are copied on write and on read, so no caller can
//! alias the stored bytes. Transactions serialize on a single mutex and
//! keep an undo log, so a handler-directed abort rolls the map back.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::trace;

use crate::blob::{Blob, HeapBlob};
use crate::cancel;
use crate::error::{ErrorKind, FsError, Result};
use crate::kv::KvFs;
use crate::path;
use crate::store::{
    OpHandler, OpId, OpResult, Record, RecordMeta, Store, Transaction, TransactionStore,
    TxDecision, TxMode, TxOptions,
};

/// A fresh filesystem backed by a [`MemStore`].
pub async fn new_fs() -> Result<KvFs> {
    KvFs::new(Arc::new(MemStore::new())).await
}

#[derive(Clone)]
struct MemEntry {
    meta: RecordMeta,
    /// `None` marks a directory.
    data: Option<Arc<Vec<u8>>>,
}

/// Process-wide in-memory store.
pub struct MemStore {
    map: Arc<DashMap<String, MemEntry>>,
    tx_lock: Arc<Mutex<()>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore { map: Arc::new(DashMap::new()), tx_lock: Arc::new(Mutex::new(())) }
    }

    async fn apply_set(&self, key: &str, record: Option<&Arc<dyn Record>>) -> Result<()> {
        self.apply_set_with_contents(key, record, None).await
    }

    async fn apply_set_with_contents(
        &self,
        key: &str,
        record: Option<&Arc<dyn Record>>,
        contents: Option<Vec<u8>>,
    ) -> Result<()> {
        match record {
            None => {
                self.map.remove(key);
            }
            Some(record) => {
                let mode = record.mode();
                let entry = if mode.is_dir() {
                    MemEntry {
                        meta: RecordMeta { size: 0, mode, modtime: record.modtime() },
                        data: None,
                    }
                } else {
                    let bytes = match contents {
                        Some(bytes) => bytes,
                        None => record.data().await?.bytes().to_vec(),
                    };
                    MemEntry {
                        meta: RecordMeta {
                            size: bytes.len() as u64,
                            mode,
                            modtime: record.modtime(),
                        },
                        data: Some(Arc::new(bytes)),
                    }
                };
                self.map.insert(key.to_owned(), entry);
            }
        }
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        MemStore::new()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get(&self, key: &str) -> Result<Arc<dyn Record>> {
        let entry = match self.map.get(key) {
            Some(entry) => entry.clone(),
            None => return Err(FsError::Kind(ErrorKind::NotExist)),
        };
        Ok(Arc::new(MemRecord { key: key.to_owned(), entry, map: self.map.clone() }))
    }

    async fn set(&self, key: &str, record: Option<Arc<dyn Record>>) -> Result<()> {
        self.apply_set(key, record.as_ref()).await
    }

    fn as_transactional(&self) -> Option<&dyn TransactionStore> {
        Some(self)
    }
}

#[async_trait]
impl TransactionStore for MemStore {
    async fn transaction(&self, options: TxOptions) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MemTransaction {
            store: MemStore { map: self.map.clone(), tx_lock: self.tx_lock.clone() },
            options,
            ops: Vec::new(),
        }))
    }
}

struct MemRecord {
    key: String,
    entry: MemEntry,
    map: Arc<DashMap<String, MemEntry>>,
}

#[async_trait]
impl Record for MemRecord {
    async fn data(&self) -> Result<Box<dyn Blob>> {
        match &self.entry.data {
            Some(bytes) => Ok(Box::new(HeapBlob::from(bytes.as_slice()))),
            None => Err(FsError::Kind(ErrorKind::IsDir)),
        }
    }

    async fn read_dir_names(&self) -> Result<Vec<String>> {
        if self.entry.data.is_some() {
            return Err(FsError::Kind(ErrorKind::NotDir));
        }
        let mut names = Vec::new();
        for item in self.map.iter() {
            let key = item.key();
            if key == path::ROOT {
                continue;
            }
            if path::parent(key) == self.key {
                names.push(path::base(key).to_owned());
            }
        }
        Ok(names)
    }

    fn size(&self) -> u64 {
        self.entry.meta.size
    }

    fn mode(&self) -> crate::fs::FileMode {
        self.entry.meta.mode
    }

    fn modtime(&self) -> SystemTime {
        self.entry.meta.modtime
    }
}

enum PendingOp {
    Get { key: String },
    Set { key: String, record: Option<Arc<dyn Record>>, contents: Option<Vec<u8>> },
}

struct Pending {
    id: OpId,
    op: PendingOp,
    handler: Option<OpHandler>,
}

/// Mutex-guarded transaction over a [`MemStore`].
struct MemTransaction {
    store: MemStore,
    options: TxOptions,
    ops: Vec<Pending>,
}

impl MemTransaction {
    fn enqueue(&mut self, op: PendingOp, handler: Option<OpHandler>) -> OpId {
        let id = self.ops.len() as OpId;
        self.ops.push(Pending { id, op, handler });
        id
    }

    fn rollback(store: &MemStore, undo: &mut Vec<(String, Option<MemEntry>)>) {
        trace!(entries = undo.len(), "rolling back transaction");
        for (key, prior) in undo.drain(..).rev() {
            match prior {
                Some(entry) => {
                    store.map.insert(key, entry);
                }
                None => {
                    store.map.remove(&key);
                }
            }
        }
    }
}

#[async_trait]
impl Transaction for MemTransaction {
    async fn get(&mut self, key: &str) -> OpId {
        self.enqueue(PendingOp::Get { key: key.to_owned() }, None)
    }

    async fn get_with(&mut self, key: &str, handler: OpHandler) -> OpId {
        self.enqueue(PendingOp::Get { key: key.to_owned() }, Some(handler))
    }

    async fn set(
        &mut self,
        key: &str,
        record: Option<Arc<dyn Record>>,
        contents: Option<Vec<u8>>,
    ) -> OpId {
        self.enqueue(PendingOp::Set { key: key.to_owned(), record, contents }, None)
    }

    async fn set_with(
        &mut self,
        key: &str,
        record: Option<Arc<dyn Record>>,
        contents: Option<Vec<u8>>,
        handler: OpHandler,
    ) -> OpId {
        self.enqueue(PendingOp::Set { key: key.to_owned(), record, contents }, Some(handler))
    }

    async fn commit(self: Box<Self>, token: cancel::Token) -> Result<Vec<OpResult>> {
        let transaction = *self;
        let MemTransaction { store, options, ops } = transaction;

        let guard = tokio::select! {
            guard = store.tx_lock.lock() => guard,
            _ = token.cancelled() => return Err(token.error()),
        };

        let mut results = Vec::with_capacity(ops.len());
        let mut undo: Vec<(String, Option<MemEntry>)> = Vec::new();
        let mut aborted = false;

        for pending in ops {
            if aborted {
                results.push(OpResult {
                    op: pending.id,
                    record: None,
                    err: Some(FsError::Kind(ErrorKind::Canceled)),
                });
                continue;
            }
            if token.is_cancelled() {
                MemTransaction::rollback(&store, &mut undo);
                return Err(token.error());
            }

            let result = match pending.op {
                PendingOp::Get { key } => match store.get(&key).await {
                    Ok(record) => OpResult { op: pending.id, record: Some(record), err: None },
                    Err(err) => OpResult { op: pending.id, record: None, err: Some(err) },
                },
                PendingOp::Set { key, record, contents } => {
                    if options.mode == TxMode::ReadOnly {
                        OpResult {
                            op: pending.id,
                            record: None,
                            err: Some(FsError::Kind(ErrorKind::Permission)),
                        }
                    } else {
                        let prior = store.map.get(&key).map(|entry| entry.clone());
                        undo.push((key.clone(), prior));
                        match store
                            .apply_set_with_contents(&key, record.as_ref(), contents)
                            .await
                        {
                            Ok(()) => OpResult { op: pending.id, record: None, err: None },
                            Err(err) => {
                                OpResult { op: pending.id, record: None, err: Some(err) }
                            }
                        }
                    }
                }
            };

            if let Some(handler) = pending.handler {
                if handler(&result) == TxDecision::Abort {
                    MemTransaction::rollback(&store, &mut undo);
                    aborted = true;
                }
            }
            results.push(result);
        }

        drop(guard);
        Ok(results)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileMode;
    use crate::kv::{DirRecord, FileRecord};

    fn file_record(bytes: &[u8]) -> Arc<dyn Record> {
        Arc::new(FileRecord::new(bytes.to_vec(), FileMode::new(0o644), SystemTime::now()))
    }

    fn dir_record() -> Arc<dyn Record> {
        Arc::new(DirRecord::new(FileMode::new(0o755), SystemTime::now()))
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemStore::new();
        assert!(store.get("nope").await.unwrap_err().is(ErrorKind::NotExist));
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemStore::new();
        store.set("f", Some(file_record(b"abc"))).await.unwrap();
        let record = store.get("f").await.unwrap();
        assert_eq!(record.size(), 3);
        assert_eq!(record.data().await.unwrap().bytes(), b"abc");

        store.set("f", None).await.unwrap();
        assert!(store.get("f").await.unwrap_err().is(ErrorKind::NotExist));
    }

    #[tokio::test]
    async fn test_prefix_scan_children() {
        let store = MemStore::new();
        store.set(".", Some(dir_record())).await.unwrap();
        store.set("a", Some(dir_record())).await.unwrap();
        store.set("a/x", Some(file_record(b""))).await.unwrap();
        store.set("a/y", Some(file_record(b""))).await.unwrap();
        store.set("a/y2/z", Some(file_record(b""))).await.unwrap();
        store.set("b", Some(file_record(b""))).await.unwrap();

        let mut names = store.get("a").await.unwrap().read_dir_names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["x", "y"]);

        let mut top = store.get(".").await.unwrap().read_dir_names().await.unwrap();
        top.sort();
        assert_eq!(top, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_transaction_results_in_order() {
        let store = MemStore::new();
        store.set("a", Some(file_record(b"1"))).await.unwrap();

        let mut tx = store.transaction(TxOptions::default()).await.unwrap();
        let first = tx.get("a").await;
        let second = tx.set("b", Some(file_record(b"2")), None).await;
        let third = tx.get("b").await;
        let results = tx.commit(cancel::Token::background()).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].op, first);
        assert_eq!(results[1].op, second);
        assert_eq!(results[2].op, third);
        assert!(results.iter().all(|result| result.ok()));
    }

    #[tokio::test]
    async fn test_handler_abort_rolls_back() {
        let store = MemStore::new();
        store.set("a", Some(file_record(b"old"))).await.unwrap();

        let mut tx = store.transaction(TxOptions::default()).await.unwrap();
        tx.set("a", Some(file_record(b"new")), None).await;
        tx.set_with("missing-parent", None, None, Box::new(|_: &OpResult| TxDecision::Abort)).await;
        tx.set("b", Some(file_record(b"later")), None).await;
        let results = tx.commit(cancel::Token::background()).await.unwrap();

        assert!(results[2].err.as_ref().is_some_and(|err| err.is(ErrorKind::Canceled)));
        let record = store.get("a").await.unwrap();
        assert_eq!(record.data().await.unwrap().bytes(), b"old");
        assert!(store.get("b").await.unwrap_err().is(ErrorKind::NotExist));
    }

    #[tokio::test]
    async fn test_readonly_transaction_rejects_writes() {
        let store = MemStore::new();
        let mut tx = store
            .transaction(TxOptions { mode: TxMode::ReadOnly })
            .await
            .unwrap();
        tx.set("a", Some(file_record(b"x")), None).await;
        let results = tx.commit(cancel::Token::background()).await.unwrap();
        assert!(results[0].err.as_ref().is_some_and(|err| err.is(ErrorKind::Permission)));
        assert!(store.get("a").await.unwrap_err().is(ErrorKind::NotExist));
    }

    #[tokio::test]
    async fn test_data_copied_not_aliased() {
        let store = MemStore::new();
        store.set("f", Some(file_record(b"abc"))).await.unwrap();
        let record = store.get("f").await.unwrap();
        let mut data = record.data().await.unwrap();
        crate::blob::set(&mut data, b"XXX", 0).unwrap();
        let again = store.get("f").await.unwrap();
        assert_eq!(again.data().await.unwrap().bytes(), b"abc");
    }
}

//! The key-value store contract backing the key-value filesystem.
//!
//! A [`Store`] maps canonical paths to [`Record`]s. Stores may opt into
//! [`TransactionStore`]; [`transaction_or_serial`] hands callers a real
//! transaction when one is available and otherwise a serial wrapper that
//! executes operations immediately, with no atomicity.

use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::blob::Blob;
use crate::cancel;
use crate::error::Result;
use crate::fs::FileMode;

/// The persisted value stored under a path key.
///
/// Directory membership is not part of the record: stores derive it by
/// prefix scan over their keys.
#[async_trait]
pub trait Record: Send + Sync {
    /// The file's byte container. Errors with `IsDir` for directories.
    async fn data(&self) -> Result<Box<dyn Blob>>;

    /// Names of the directory's children. Errors with `NotDir` for files.
    async fn read_dir_names(&self) -> Result<Vec<String>>;

    /// Length of the file's contents; zero for directories.
    fn size(&self) -> u64;

    /// Mode bits, including the type bits.
    fn mode(&self) -> FileMode;

    /// Modification time.
    fn modtime(&self) -> SystemTime;

    /// Opaque backend-specific handle.
    fn sys(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

impl std::fmt::Debug for dyn Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record").field("size", &self.size()).field("mode", &self.mode()).finish()
    }
}

/// The persistable metadata slice of a record.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordMeta {
    pub size: u64,
    pub mode: FileMode,
    pub modtime: SystemTime,
}

impl RecordMeta {
    /// Captures the metadata of `record`.
    pub fn of(record: &dyn Record) -> RecordMeta {
        RecordMeta { size: record.size(), mode: record.mode(), modtime: record.modtime() }
    }
}

/// A key-value store of path-keyed records.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches the record at `key`. Errors with `NotExist` when missing.
    async fn get(&self, key: &str) -> Result<Arc<dyn Record>>;

    /// Persists `record` at `key`; `None` deletes. Implementations
    /// materialize file contents by invoking [`Record::data`].
    async fn set(&self, key: &str, record: Option<Arc<dyn Record>>) -> Result<()>;

    /// Transaction support, if advertised.
    fn as_transactional(&self) -> Option<&dyn TransactionStore> {
        None
    }
}

/// A store offering transactions.
#[async_trait]
pub trait TransactionStore: Store {
    async fn transaction(&self, options: TxOptions) -> Result<Box<dyn Transaction>>;
}

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxMode {
    /// Writes submitted to the transaction are rejected per-op.
    ReadOnly,
    /// Reads and writes are accepted.
    #[default]
    ReadWrite,
}

/// Options for [`TransactionStore::transaction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TxOptions {
    pub mode: TxMode,
}

/// Identifier of one enqueued transaction operation, monotonic within the
/// transaction in submission order.
pub type OpId = u64;

/// Outcome of one transaction operation.
pub struct OpResult {
    /// The operation this result belongs to.
    pub op: OpId,
    /// The fetched record, for `get` operations that succeeded.
    pub record: Option<Arc<dyn Record>>,
    /// The failure, if the operation failed.
    pub err: Option<crate::error::FsError>,
}

impl OpResult {
    pub fn ok(&self) -> bool {
        self.err.is_none()
    }
}

/// Verdict returned by an operation handler during commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxDecision {
    /// Keep committing.
    Continue,
    /// Abort the transaction.
    Abort,
}

/// Callback run against an operation's result during commit.
pub type OpHandler = Box<dyn FnOnce(&OpResult) -> TxDecision + Send>;

/// An in-flight transaction.
///
/// Operations are enqueued (or, for serial wrappers, executed on the
/// spot) and their results reported by `commit` in submission order.
#[async_trait]
pub trait Transaction: Send {
    /// Enqueues a fetch of `key`.
    async fn get(&mut self, key: &str) -> OpId;

    /// Enqueues a fetch of `key` with a commit-time handler.
    async fn get_with(&mut self, key: &str, handler: OpHandler) -> OpId;

    /// Enqueues a write of `record` (or a delete) at `key`. `contents`
    /// optionally carries pre-materialized file data so the store does
    /// not need to invoke [`Record::data`] again.
    async fn set(
        &mut self,
        key: &str,
        record: Option<Arc<dyn Record>>,
        contents: Option<Vec<u8>>,
    ) -> OpId;

    /// Enqueues a write with a commit-time handler.
    async fn set_with(
        &mut self,
        key: &str,
        record: Option<Arc<dyn Record>>,
        contents: Option<Vec<u8>>,
        handler: OpHandler,
    ) -> OpId;

    /// Applies the enqueued operations, reporting results in op order.
    /// Handlers run as their operation completes and may abort the
    /// remainder; cancellation through `token` abandons the commit with
    /// the token's error.
    async fn commit(self: Box<Self>, token: cancel::Token) -> Result<Vec<OpResult>>;

    /// Discards the transaction.
    async fn abort(self: Box<Self>) -> Result<()>;
}

/// A native transaction when the store advertises one, a serial wrapper
/// otherwise.
pub async fn transaction_or_serial(
    store: &Arc<dyn Store>,
    options: TxOptions,
) -> Result<Box<dyn Transaction>> {
    match store.as_transactional() {
        Some(capable) => capable.transaction(options).await,
        None => Ok(Box::new(SerialTransaction {
            store: store.clone(),
            options,
            results: Vec::new(),
            decision: TxDecision::Continue,
        })),
    }
}

/// Fallback transaction that executes each operation the moment it is
/// submitted. Offers ordering but no atomicity.
struct SerialTransaction {
    store: Arc<dyn Store>,
    options: TxOptions,
    results: Vec<OpResult>,
    decision: TxDecision,
}

impl SerialTransaction {
    fn next_id(&self) -> OpId {
        self.results.len() as OpId
    }

    fn push(&mut self, mut result: OpResult, handler: Option<OpHandler>) -> OpId {
        let id = result.op;
        if self.decision == TxDecision::Abort {
            result.err = Some(crate::error::FsError::Kind(crate::error::ErrorKind::Canceled));
            result.record = None;
        } else if let Some(handler) = handler {
            if handler(&result) == TxDecision::Abort {
                self.decision = TxDecision::Abort;
            }
        }
        self.results.push(result);
        id
    }
}

#[async_trait]
impl Transaction for SerialTransaction {
    async fn get(&mut self, key: &str) -> OpId {
        self.get_with(key, Box::new(|_: &OpResult| TxDecision::Continue)).await
    }

    async fn get_with(&mut self, key: &str, handler: OpHandler) -> OpId {
        let op = self.next_id();
        let result = if self.decision == TxDecision::Abort {
            OpResult { op, record: None, err: None }
        } else {
            match self.store.get(key).await {
                Ok(record) => OpResult { op, record: Some(record), err: None },
                Err(err) => OpResult { op, record: None, err: Some(err) },
            }
        };
        self.push(result, Some(handler))
    }

    async fn set(
        &mut self,
        key: &str,
        record: Option<Arc<dyn Record>>,
        contents: Option<Vec<u8>>,
    ) -> OpId {
        self.set_with(key, record, contents, Box::new(|_: &OpResult| TxDecision::Continue)).await
    }

    async fn set_with(
        &mut self,
        key: &str,
        record: Option<Arc<dyn Record>>,
        _contents: Option<Vec<u8>>,
        handler: OpHandler,
    ) -> OpId {
        let op = self.next_id();
        let result = if self.decision == TxDecision::Abort {
            OpResult { op, record: None, err: None }
        } else if self.options.mode == TxMode::ReadOnly {
            OpResult {
                op,
                record: None,
                err: Some(crate::error::FsError::Kind(crate::error::ErrorKind::Permission)),
            }
        } else {
            match self.store.set(key, record).await {
                Ok(()) => OpResult { op, record: None, err: None },
                Err(err) => OpResult { op, record: None, err: Some(err) },
            }
        };
        self.push(result, Some(handler))
    }

    async fn commit(self: Box<Self>, token: cancel::Token) -> Result<Vec<OpResult>> {
        if token.is_cancelled() {
            return Err(token.error());
        }
        Ok(self.results)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

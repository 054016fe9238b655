//! Mosaic - a composable virtual filesystem framework.
//!
//! Backends implement the [`fs::Fs`] trait plus whatever capability
//! traits they support; consumers operate on any backend through the
//! generic dispatch helpers in [`fs::dispatch`], which fall back to
//! portable renderings of missing capabilities where that is possible.
//!
//! The crate ships a key-value filesystem engine ([`kv::KvFs`]) over a
//! pluggable store contract ([`store::Store`]), an in-memory store
//! ([`mem::MemStore`]), a longest-prefix mount composer
//! ([`mount::MountFs`]), a read-only pull-through cache
//! ([`cache::CacheFs`]), a streaming tar reader ([`tar::TarFs`]) and
//! sub-directory views ([`sub::SubDirFs`]).

pub mod blob;
pub mod cache;
pub mod cancel;
pub mod error;
pub mod fs;
pub mod kv;
pub mod mem;
pub mod mount;
pub mod path;
pub mod store;
pub mod sub;
pub mod tar;

pub use error::{ErrorKind, FsError, LinkError, PathError, Result};
pub use fs::{DirEntry, File, FileInfo, FileMode, Fs, OpenFlags};

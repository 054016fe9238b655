//! File metadata types: modes, open flags, [`FileInfo`] and [`DirEntry`].

use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::OnceCell;

use crate::error::{path_error, ErrorKind, Result};
use crate::fs::{dispatch, Fs};

/// File mode bits in the standard POSIX encoding: a file type in the
/// `0o170000` mask, setuid/setgid/sticky, and nine permission bits.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileMode(u32);

impl FileMode {
    /// Mask selecting the file type bits.
    pub const TYPE_MASK: FileMode = FileMode(0o170000);
    /// Directory.
    pub const DIR: FileMode = FileMode(0o040000);
    /// Regular file.
    pub const REGULAR: FileMode = FileMode(0o100000);
    /// Symbolic link.
    pub const SYMLINK: FileMode = FileMode(0o120000);
    /// Named pipe.
    pub const FIFO: FileMode = FileMode(0o010000);
    /// Socket.
    pub const SOCKET: FileMode = FileMode(0o140000);
    /// Character device.
    pub const CHAR_DEVICE: FileMode = FileMode(0o020000);
    /// Block device.
    pub const BLOCK_DEVICE: FileMode = FileMode(0o060000);

    /// Set-user-id.
    pub const SETUID: FileMode = FileMode(0o4000);
    /// Set-group-id.
    pub const SETGID: FileMode = FileMode(0o2000);
    /// Sticky.
    pub const STICKY: FileMode = FileMode(0o1000);

    /// Mask selecting the nine permission bits.
    pub const PERM_MASK: FileMode = FileMode(0o777);
    /// Mask selecting the bits `chmod` may change.
    pub const CHMOD_MASK: FileMode = FileMode(0o7777);

    /// Wraps raw mode bits.
    pub const fn new(bits: u32) -> FileMode {
        FileMode(bits)
    }

    /// The raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The file type bits alone.
    pub fn file_type(self) -> FileMode {
        self & FileMode::TYPE_MASK
    }

    /// The permission bits alone.
    pub fn perm(self) -> FileMode {
        self & FileMode::PERM_MASK
    }

    pub fn is_dir(self) -> bool {
        self.file_type() == FileMode::DIR
    }

    pub fn is_regular(self) -> bool {
        // A zero type field also counts as regular, matching records
        // created with bare permission bits.
        let file_type = self.file_type();
        file_type == FileMode::REGULAR || file_type == FileMode::new(0)
    }

    pub fn is_symlink(self) -> bool {
        self.file_type() == FileMode::SYMLINK
    }

    /// Replaces the [`FileMode::CHMOD_MASK`] bits, preserving the rest.
    pub fn chmod(self, mode: FileMode) -> FileMode {
        (self & !FileMode::CHMOD_MASK) | (mode & FileMode::CHMOD_MASK)
    }
}

impl std::ops::BitAnd for FileMode {
    type Output = FileMode;

    fn bitand(self, rhs: FileMode) -> FileMode {
        FileMode(self.0 & rhs.0)
    }
}

impl std::ops::BitOr for FileMode {
    type Output = FileMode;

    fn bitor(self, rhs: FileMode) -> FileMode {
        FileMode(self.0 | rhs.0)
    }
}

impl std::ops::Not for FileMode {
    type Output = FileMode;

    fn not(self) -> FileMode {
        FileMode(!self.0)
    }
}

impl std::fmt::Debug for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileMode({:#o})", self.0)
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let type_char = match self.file_type() {
            FileMode::DIR => 'd',
            FileMode::SYMLINK => 'l',
            FileMode::FIFO => 'p',
            FileMode::SOCKET => 's',
            FileMode::CHAR_DEVICE => 'c',
            FileMode::BLOCK_DEVICE => 'b',
            _ => '-',
        };
        f.write_str(&type_char.to_string())?;
        for shift in [6u32, 3, 0] {
            let bits = (self.0 >> shift) & 0o7;
            f.write_str(if bits & 0o4 != 0 { "r" } else { "-" })?;
            f.write_str(if bits & 0o2 != 0 { "w" } else { "-" })?;
            f.write_str(if bits & 0o1 != 0 { "x" } else { "-" })?;
        }
        Ok(())
    }
}

bitflags::bitflags! {
    /// Flags accepted by `open_file`.
    ///
    /// The empty set is read-only access; [`OpenFlags::WRITE_ONLY`] and
    /// [`OpenFlags::READ_WRITE`] select the other access modes, and the
    /// remaining flags are additive modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const WRITE_ONLY = 1 << 0;
        const READ_WRITE = 1 << 1;
        const APPEND = 1 << 2;
        const CREATE = 1 << 3;
        const EXCLUSIVE = 1 << 4;
        const SYNC = 1 << 5;
        const TRUNCATE = 1 << 6;
    }
}

impl OpenFlags {
    /// Read-only access: the empty flag set.
    pub const READ_ONLY: OpenFlags = OpenFlags::empty();

    /// True when the handle may be read from.
    pub fn readable(self) -> bool {
        !self.contains(OpenFlags::WRITE_ONLY)
    }

    /// True when the handle may be written to.
    pub fn writable(self) -> bool {
        self.intersects(OpenFlags::WRITE_ONLY | OpenFlags::READ_WRITE)
    }

    /// True when both access mode bits are set, which is malformed.
    pub fn conflicting_access(self) -> bool {
        self.contains(OpenFlags::WRITE_ONLY | OpenFlags::READ_WRITE)
    }
}

/// Immutable view of a file's metadata.
#[derive(Clone)]
pub struct FileInfo {
    /// Base name of the file.
    pub name: String,
    /// Length of the file's contents in bytes.
    pub size: u64,
    /// Mode bits.
    pub mode: FileMode,
    /// Modification time.
    pub modtime: SystemTime,
    /// Opaque backend-specific handle.
    pub sys: Option<Arc<dyn Any + Send + Sync>>,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}

impl std::fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileInfo")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mode", &self.mode)
            .field("modtime", &self.modtime)
            .finish_non_exhaustive()
    }
}

/// Directory listing element with a lazily fetched [`FileInfo`].
pub struct DirEntry {
    name: String,
    is_dir: bool,
    origin: Option<(Arc<dyn Fs>, String)>,
    info: OnceCell<FileInfo>,
}

impl DirEntry {
    /// An entry with no metadata beyond its name and kind.
    pub fn new(name: impl Into<String>, is_dir: bool) -> DirEntry {
        DirEntry { name: name.into(), is_dir, origin: None, info: OnceCell::new() }
    }

    /// An entry whose [`DirEntry::info`] stats `full_path` on `fs` on
    /// first use and memoizes the result.
    pub fn with_origin(
        name: impl Into<String>,
        is_dir: bool,
        fs: Arc<dyn Fs>,
        full_path: impl Into<String>,
    ) -> DirEntry {
        DirEntry { name: name.into(), is_dir, origin: Some((fs, full_path.into())), info: OnceCell::new() }
    }

    /// An entry whose metadata is already known.
    pub fn from_info(info: FileInfo) -> DirEntry {
        let name = info.name.clone();
        let is_dir = info.is_dir();
        DirEntry { name, is_dir, origin: None, info: OnceCell::new_with(Some(info)) }
    }

    /// Base name of the entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Full metadata, fetched at most once.
    pub async fn info(&self) -> Result<FileInfo> {
        let info = self
            .info
            .get_or_try_init(|| async {
                match &self.origin {
                    Some((fs, full_path)) => dispatch::stat(fs.as_ref(), full_path).await,
                    None => Err(path_error("stat", &self.name, ErrorKind::NotImplemented)),
                }
            })
            .await?;
        Ok(info.clone())
    }
}

impl Clone for DirEntry {
    fn clone(&self) -> Self {
        let info = OnceCell::new();
        if let Some(known) = self.info.get() {
            let _ = info.set(known.clone());
        }
        DirEntry {
            name: self.name.clone(),
            is_dir: self.is_dir,
            origin: self.origin.clone(),
            info,
        }
    }
}

impl std::fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirEntry")
            .field("name", &self.name)
            .field("is_dir", &self.is_dir)
            .finish_non_exhaustive()
    }
}

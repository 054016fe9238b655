//! Defines the canonical filesystem error taxonomy --- [`FsError`].
//!
//! Every error returned at a public filesystem surface is wrapped in a
//! [`PathError`] (or [`LinkError`] for two-path operations) carrying the
//! short operation verb and the path the caller supplied. Classification
//! with [`FsError::is`] unwraps the context wrappers transparently.

use std::io;
use std::sync::Arc;

/// Result of filesystem operations.
pub type Result<T> = std::result::Result<T, FsError>;

/// Canonical error kinds.
///
/// Each kind is a distinguishable value; [`FsError::is`] compares against
/// them through any number of [`PathError`]/[`LinkError`] wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, e.g. an invalid path or a negative seek target.
    Invalid,
    /// Operation denied.
    Permission,
    /// The target already exists.
    Exist,
    /// The target does not exist.
    NotExist,
    /// Operation on a closed file handle.
    Closed,
    /// The target is a directory and the operation expected a file.
    IsDir,
    /// The target is not a directory and the operation expected one.
    NotDir,
    /// A directory could not be removed because it has children.
    NotEmpty,
    /// The backend does not advertise the requested capability.
    NotImplemented,
    /// A blob offset or range lies beyond the container's bounds.
    OutOfBounds,
    /// The operation was abandoned because its cancellation token fired.
    Canceled,
    /// An underlying I/O failure with no more specific mapping.
    Io,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Invalid => "invalid argument",
            ErrorKind::Permission => "permission denied",
            ErrorKind::Exist => "file already exists",
            ErrorKind::NotExist => "file does not exist",
            ErrorKind::Closed => "file already closed",
            ErrorKind::IsDir => "is a directory",
            ErrorKind::NotDir => "not a directory",
            ErrorKind::NotEmpty => "directory not empty",
            ErrorKind::NotImplemented => "operation not implemented",
            ErrorKind::OutOfBounds => "offset out of bounds",
            ErrorKind::Canceled => "operation canceled",
            ErrorKind::Io => "i/o error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-path operation context.
#[derive(Debug, thiserror::Error)]
#[error("{op} {path}: {source}")]
pub struct PathError {
    /// Short operation verb, e.g. `"open"` or `"mkdir"`.
    pub op: &'static str,
    /// The path the caller supplied.
    pub path: String,
    /// The wrapped failure.
    pub source: Box<FsError>,
}

/// Two-path operation context, used by `rename` and `symlink`.
#[derive(Debug, thiserror::Error)]
#[error("{op} {old} {new}: {source}")]
pub struct LinkError {
    /// Short operation verb, e.g. `"rename"`.
    pub op: &'static str,
    /// The source path.
    pub old: String,
    /// The destination path.
    pub new: String,
    /// The wrapped failure.
    pub source: Box<FsError>,
}

/// Filesystem error.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// A bare canonical kind, before context is attached.
    #[error("{0}")]
    Kind(ErrorKind),
    /// A kind-carrying failure with a single-path context.
    #[error(transparent)]
    Path(#[from] PathError),
    /// A kind-carrying failure with a two-path context.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// A shared failure fanned out to several waiters, e.g. the terminal
    /// unarchive error delivered to every blocked opener.
    #[error(transparent)]
    Shared(Arc<FsError>),
    /// A foreign I/O failure. Classification normalizes the common
    /// `io::ErrorKind` values onto the canonical taxonomy.
    #[error("{0}")]
    Io(#[from] io::Error),
    /// A backend-specific failure described only by a message.
    #[error("{0}")]
    Backend(String),
}

impl FsError {
    /// Classifies the error, looking through context wrappers.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FsError::Kind(kind) => Some(*kind),
            FsError::Path(err) => err.source.kind(),
            FsError::Link(err) => err.source.kind(),
            FsError::Shared(err) => err.kind(),
            FsError::Io(err) => Some(io_kind(err)),
            FsError::Backend(_) => None,
        }
    }

    /// True when the error classifies as `kind` after unwrapping.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }

    /// Recovers the outermost [`PathError`] context, if any.
    pub fn as_path_error(&self) -> Option<&PathError> {
        match self {
            FsError::Path(err) => Some(err),
            FsError::Shared(err) => err.as_path_error(),
            _ => None,
        }
    }

    /// Recovers the outermost [`LinkError`] context, if any.
    pub fn as_link_error(&self) -> Option<&LinkError> {
        match self {
            FsError::Link(err) => Some(err),
            FsError::Shared(err) => err.as_link_error(),
            _ => None,
        }
    }

    /// Wraps the error in a [`PathError`] context.
    ///
    /// An error that already carries a context for the same operation is
    /// left untouched so nested dispatch does not stack duplicate wrappers.
    pub fn with_path(self, op: &'static str, path: impl Into<String>) -> FsError {
        match self {
            FsError::Path(err) if err.op == op => FsError::Path(err),
            other => FsError::Path(PathError { op, path: path.into(), source: Box::new(other) }),
        }
    }

    /// Wraps the error in a [`LinkError`] context.
    pub fn with_link(
        self,
        op: &'static str,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> FsError {
        match self {
            FsError::Link(err) if err.op == op => FsError::Link(err),
            other => FsError::Link(LinkError {
                op,
                old: old.into(),
                new: new.into(),
                source: Box::new(other),
            }),
        }
    }
}

impl From<ErrorKind> for FsError {
    fn from(kind: ErrorKind) -> Self {
        FsError::Kind(kind)
    }
}

/// Shorthand for `ErrorKind` wrapped in a [`PathError`].
pub fn path_error(op: &'static str, path: impl Into<String>, kind: ErrorKind) -> FsError {
    FsError::Kind(kind).with_path(op, path)
}

/// Shorthand for `ErrorKind` wrapped in a [`LinkError`].
pub fn link_error(
    op: &'static str,
    old: impl Into<String>,
    new: impl Into<String>,
    kind: ErrorKind,
) -> FsError {
    FsError::Kind(kind).with_link(op, old, new)
}

fn io_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotExist,
        io::ErrorKind::AlreadyExists => ErrorKind::Exist,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        io::ErrorKind::InvalidInput => ErrorKind::Invalid,
        _ => ErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_through_wrappers() {
        let err = path_error("open", "a/b", ErrorKind::NotExist);
        assert!(err.is(ErrorKind::NotExist));
        assert!(!err.is(ErrorKind::Exist));

        let err = link_error("rename", "a", "b", ErrorKind::Exist);
        assert!(err.is(ErrorKind::Exist));
    }

    #[test]
    fn test_path_error_display() {
        let err = path_error("mkdir", "a/b", ErrorKind::NotDir);
        assert_eq!(err.to_string(), "mkdir a/b: not a directory");
    }

    #[test]
    fn test_link_error_display() {
        let err = link_error("rename", "old", "new", ErrorKind::NotExist);
        assert_eq!(err.to_string(), "rename old new: file does not exist");
    }

    #[test]
    fn test_no_duplicate_wrapping() {
        let err = path_error("open", "a", ErrorKind::NotExist).with_path("open", "a");
        let path = err.as_path_error().expect("path context");
        assert!(matches!(path.source.as_ref(), FsError::Kind(ErrorKind::NotExist)));
    }

    #[test]
    fn test_io_normalization() {
        let err = FsError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.is(ErrorKind::NotExist));
        let err = FsError::from(io::Error::new(io::ErrorKind::AlreadyExists, "there"));
        assert!(err.is(ErrorKind::Exist));
    }

    #[test]
    fn test_shared_classification() {
        let inner = Arc::new(path_error("open", "x", ErrorKind::Canceled));
        let err = FsError::Shared(inner);
        assert!(err.is(ErrorKind::Canceled));
        assert!(err.as_path_error().is_some());
    }
}

//! Error types for mirroring operations
//!
//! Every fallible primitive returns [`MirrorError`]. The guarded executor
//! (`exec`) classifies failures by [`MirrorError::kind`] when deciding how to
//! report them; nothing in the engine branches on error *messages*.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

/// Failure classification, independent of the error's payload.
///
/// `NotFound`, `AccessDenied`, `IoOther` and `UnrecognizedReparseTag` are
/// expected per-entry failures: the affected entry is skipped and the run
/// continues. `Unreachable` marks a violated engine precondition and is
/// reported on the critical channel. `FatalConfig` aborts the run before any
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    IoOther,
    UnrecognizedReparseTag,
    Unreachable,
    FatalConfig,
}

/// Error type for all filesystem and engine operations.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The entry vanished between listing and use.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// ACLs blocked the operation despite backup privileges.
    #[error("access denied: {path}")]
    AccessDenied { path: String },

    /// Any other OS-level failure.
    #[error("{message}: {path}")]
    Io { path: String, message: String },

    /// A reparse point whose tag is neither MOUNT_POINT nor SYMLINK.
    #[error("unrecognized reparse tag {tag:#010x}: {path}")]
    UnrecognizedReparseTag { path: String, tag: u32 },

    /// A precondition the engine believed held didn't.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Missing/unapproved guard file, bad task pair count, or similar.
    #[error("{0}")]
    FatalConfig(String),
}

impl MirrorError {
    /// Classify this error for reporting decisions.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::Io { .. } => ErrorKind::IoOther,
            Self::UnrecognizedReparseTag { .. } => ErrorKind::UnrecognizedReparseTag,
            Self::Unreachable(_) => ErrorKind::Unreachable,
            Self::FatalConfig(_) => ErrorKind::FatalConfig,
        }
    }

    /// Map an [`std::io::Error`] raised while operating on `path`.
    ///
    /// `NotFound` and `PermissionDenied` keep their identity; everything else
    /// collapses into [`MirrorError::Io`] with the OS message preserved.
    #[must_use]
    pub fn from_io(path: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path: path.to_string() },
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied { path: path.to_string() },
            _ => Self::Io {
                path: path.to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Shorthand for an [`MirrorError::Io`] with a literal message.
    #[must_use]
    pub fn io(path: &str, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

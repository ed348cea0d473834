//! Error types for the coffer storage layer.
//!
//! Uses thiserror for derive macros. Every failure mode a caller might
//! branch on gets its own variant with structured fields; callers match
//! on variants rather than parsing messages.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for coffer operations.
///
/// The path-security variants (`SymlinkRejected`, `PathTraversal`,
/// `PathEscapesRoot`, `NotARegularFile`, `NotADirectory`) and the lock
/// variants (`LockTimeout`, `LockHeldByOther`, `LockFileCorrupt`) are
/// deliberately never collapsed into a generic failure: callers make
/// different decisions for each (e.g. retry on timeout vs. prompt for a
/// manual break when a live owner holds the lock).
#[derive(Error, Debug)]
pub enum CofferError {
    /// A symlink was encountered where a real file or directory is required.
    #[error("symlink rejected at '{}'", path.display())]
    SymlinkRejected {
        /// Path of the offending symlink.
        path: PathBuf,
    },

    /// A caller-supplied relative path is empty, absolute, or contains a
    /// leading `..` traversal segment.
    #[error("path traversal rejected: '{}'", path.display())]
    PathTraversal {
        /// The rejected input path, as supplied.
        path: PathBuf,
    },

    /// A path resolves outside its designated root directory.
    #[error("path '{}' escapes root '{}'", path.display(), root.display())]
    PathEscapesRoot {
        /// The resolved candidate path.
        path: PathBuf,
        /// The boundary directory it must stay under.
        root: PathBuf,
    },

    /// An opened path turned out not to be a regular file.
    #[error("not a regular file: '{}'", path.display())]
    NotARegularFile {
        /// The offending path.
        path: PathBuf,
    },

    /// An intermediate path component exists but is not a directory.
    #[error("not a directory: '{}'", path.display())]
    NotADirectory {
        /// The offending component.
        path: PathBuf,
    },

    /// Lock acquisition gave up after the caller's timeout elapsed.
    ///
    /// Distinct from [`CofferError::LockHeldByOther`]: a timeout means the
    /// holder stayed live (and unbreakable) for the whole wait, not that
    /// acquisition was refused outright.
    #[error("timed out after {waited_ms}ms waiting for lock '{}'", path.display())]
    LockTimeout {
        /// Path of the contended lock file.
        path: PathBuf,
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// The lock file exists and its recorded owner is not breakable.
    #[error("lock '{}' is held by {owner}", path.display())]
    LockHeldByOther {
        /// Path of the lock file.
        path: PathBuf,
        /// Owner identity from the lock file (`pid@hostname`).
        owner: String,
    },

    /// The lock file exists but its content is not valid lock metadata.
    ///
    /// Never auto-healed: recovery requires an explicit
    /// [`force_break`](crate::lock::force_break).
    #[error("lock file '{}' is corrupt: {detail}", path.display())]
    LockFileCorrupt {
        /// Path of the lock file.
        path: PathBuf,
        /// Parse failure detail.
        detail: String,
    },

    /// The atomic rename step of a durable write failed.
    ///
    /// Propagated as-is and never auto-retried; the temp file has already
    /// been cleaned up and the destination is untouched.
    #[error("failed to rename '{}' to '{}': {source}", from.display(), to.display())]
    RenameFailed {
        /// Temp file that was to be renamed.
        from: PathBuf,
        /// Intended destination.
        to: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Any other I/O failure, with the operation that produced it.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
}

impl CofferError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CofferError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for coffer operations.
pub type Result<T> = std::result::Result<T, CofferError>;

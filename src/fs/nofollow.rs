//! Symlink-refusing file opens.
//!
//! One interface, two backends selected by platform:
//!
//! - **POSIX**: a single `open(2)` with `O_NOFOLLOW` — the kernel rejects a
//!   terminal symlink atomically at open time, so there is no check/use gap
//!   to race.
//! - **Elsewhere**: an `lstat` immediately before the open. This leaves a
//!   residual TOCTOU window between the check and the open; that window is
//!   an accepted platform limitation, documented rather than papered over
//!   with a false sense of safety.
//!
//! Both backends `fstat` the open descriptor afterwards and reject anything
//! that is not a regular file — the descriptor is already bound to the
//! inode, so that check cannot race.

use crate::error::{CofferError, Result};
use crate::path::containment::is_path_contained_in_resolved;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Open a file for reading, refusing to follow a terminal symlink.
///
/// Returns [`CofferError::SymlinkRejected`] when the path names a symlink
/// and [`CofferError::NotARegularFile`] when the opened descriptor is a
/// directory or other non-regular file.
pub fn open_no_follow(path: &Path) -> Result<File> {
    let file = open_impl(path)?;

    // fstat on the opened fd, not the path: defense in depth against
    // anything that slipped past the open-time check.
    let metadata = file
        .metadata()
        .map_err(|e| CofferError::io(format!("failed to fstat '{}'", path.display()), e))?;
    if !metadata.is_file() {
        return Err(CofferError::NotARegularFile {
            path: path.to_path_buf(),
        });
    }

    Ok(file)
}

#[cfg(unix)]
fn open_impl(path: &Path) -> Result<File> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    options.read(true);
    options.custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC);

    options.open(path).map_err(|e| {
        if e.raw_os_error() == Some(libc::ELOOP) {
            CofferError::SymlinkRejected {
                path: path.to_path_buf(),
            }
        } else {
            CofferError::io(format!("failed to open '{}'", path.display()), e)
        }
    })
}

#[cfg(not(unix))]
fn open_impl(path: &Path) -> Result<File> {
    // lstat-then-open approximation; see the module docs for the accepted
    // race window.
    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| CofferError::io(format!("failed to lstat '{}'", path.display()), e))?;
    if metadata.file_type().is_symlink() {
        return Err(CofferError::SymlinkRejected {
            path: path.to_path_buf(),
        });
    }

    File::open(path).map_err(|e| CofferError::io(format!("failed to open '{}'", path.display()), e))
}

/// Open a file no-follow and verify, post-open, that its real path still
/// falls under `root`.
///
/// This is the companion to
/// [`validate_artifact_path`](crate::path::validate::validate_artifact_path):
/// validation is check-time, and an intermediate symlink planted between
/// validation and open would redirect the subtree without tripping
/// `O_NOFOLLOW` (which only guards the terminal component). Rechecking the
/// resolved path after the open closes that window.
pub fn open_no_follow_in_root(path: &Path, root: &Path) -> Result<File> {
    let file = open_no_follow(path)?;

    if !is_path_contained_in_resolved(path, root) {
        return Err(CofferError::PathEscapesRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        });
    }

    Ok(file)
}

/// Read a file's full content, refusing to follow a terminal symlink.
pub fn read_no_follow(path: &Path) -> Result<Vec<u8>> {
    let mut file = open_no_follow(path)?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .map_err(|e| CofferError::io(format!("failed to read '{}'", path.display()), e))?;
    Ok(content)
}

/// Read a file as UTF-8, refusing to follow a terminal symlink.
pub fn read_to_string_no_follow(path: &Path) -> Result<String> {
    let mut file = open_no_follow(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| CofferError::io(format!("failed to read '{}'", path.display()), e))?;
    Ok(content)
}

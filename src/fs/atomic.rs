//! Durable atomic file writes.
//!
//! A write is never observable half-done: content goes to a temp file in
//! the **same directory** as the target (cross-device renames are not
//! atomic and may silently degrade to copy+delete), is fsynced, and is
//! then renamed over the target in one step. A crash at any instant leaves
//! the target at either its fully-old or fully-new content.
//!
//! # Cross-platform behavior
//!
//! - **POSIX**: `rename(2)` atomically replaces an existing destination.
//! - **Windows**: plain rename fails when the destination exists; a
//!   `MoveFileExW` replace fallback provides the same all-or-nothing
//!   observable semantics.
//!
//! # Temp file convention
//!
//! `<target-basename>.tmp.<random-suffix>`, created exclusively. The
//! unpredictable suffix prevents collisions between racing writers and
//! pre-planted-symlink attacks at a guessable name. On failure the temp
//! file is deleted best-effort before the primary error propagates; after
//! a crash an orphaned temp file is safely ignorable.

use crate::error::{CofferError, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Atomically and durably write bytes to a file.
///
/// Implements write → fsync → atomic rename, with a best-effort fsync of
/// the containing directory afterwards. The data is durable on disk
/// *before* it becomes visible under the final name, so a crash between
/// write and rename can never expose a truncated file.
///
/// The parent directory must already exist — use
/// [`mkdir_safe`](crate::fs::mkdir::mkdir_safe) first; creating the chain
/// here would bypass its per-component symlink checks.
///
/// Concurrent callers on the same path each see an all-or-nothing result,
/// but which writer wins is up to rename ordering. Callers needing
/// deterministic single-writer semantics wrap the write in a
/// [`SessionLock`](crate::lock::SessionLock).
pub fn durable_atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        CofferError::io(
            format!("invalid target path '{}'", path.display()),
            std::io::ErrorKind::InvalidInput.into(),
        )
    })?;

    // Exclusive create with a random suffix, co-located with the target.
    let mut temp = tempfile::Builder::new()
        .prefix(&format!("{file_name}.tmp."))
        .tempfile_in(parent)
        .map_err(|e| {
            CofferError::io(
                format!("failed to create temp file in '{}'", parent.display()),
                e,
            )
        })?;

    // Any early return below drops the temp handle, which deletes the
    // file; the destination is never touched until the rename.
    temp.write_all(content)
        .map_err(|e| CofferError::io("failed to write temp file", e))?;

    temp.as_file()
        .sync_all()
        .map_err(|e| CofferError::io("failed to sync temp file to disk", e))?;

    // Close the descriptor; the path keeps its delete-on-drop guard.
    let temp_path = temp.into_temp_path();
    atomic_replace(&temp_path, path)?;

    // Renamed away — disarm the cleanup guard so drop doesn't chase a
    // path that no longer exists.
    let _ = temp_path.keep();

    sync_parent_dir(path);

    Ok(())
}

/// Atomically write a string to a file.
///
/// Convenience wrapper around [`durable_atomic_write`] for string content.
pub fn durable_atomic_write_str<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    durable_atomic_write(path, content.as_bytes())
}

/// Atomically replace `target` with `source` via `rename(2)`.
#[cfg(unix)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    std::fs::rename(source, target).map_err(|e| CofferError::RenameFailed {
        from: source.to_path_buf(),
        to: target.to_path_buf(),
        source: e,
    })
}

/// Windows replace fallback: plain rename first, then `MoveFileExW` with
/// `MOVEFILE_REPLACE_EXISTING` when the destination already exists.
#[cfg(windows)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    use std::os::windows::ffi::OsStrExt;

    match std::fs::rename(source, target) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            // Fall through to the replace path.
        }
        Err(e) => {
            return Err(CofferError::RenameFailed {
                from: source.to_path_buf(),
                to: target.to_path_buf(),
                source: e,
            });
        }
    }

    unsafe {
        let source_wide: Vec<u16> = source
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let target_wide: Vec<u16> = target
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        const MOVEFILE_REPLACE_EXISTING: u32 = 0x1;
        const MOVEFILE_WRITE_THROUGH: u32 = 0x8;

        #[link(name = "kernel32")]
        unsafe extern "system" {
            fn MoveFileExW(
                lpExistingFileName: *const u16,
                lpNewFileName: *const u16,
                dwFlags: u32,
            ) -> i32;

            fn GetLastError() -> u32;
        }

        let result = MoveFileExW(
            source_wide.as_ptr(),
            target_wide.as_ptr(),
            MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
        );

        if result == 0 {
            let error_code = GetLastError();
            return Err(CofferError::RenameFailed {
                from: source.to_path_buf(),
                to: target.to_path_buf(),
                source: std::io::Error::from_raw_os_error(error_code as i32),
            });
        }
    }

    Ok(())
}

/// Best-effort fsync of the directory containing `target`, so the rename
/// itself is persisted. Not all filesystems (or platforms) support opening
/// a directory for sync; failure here is logged and swallowed — the
/// primary durability guarantee already holds from the temp-file fsync
/// plus atomic rename.
fn sync_parent_dir(target: &Path) {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::warn!(
            dir = %parent.display(),
            error = %e,
            "directory fsync unsupported; rename durability is best-effort"
        );
    }
}

//! Symlink-safe directory creation.
//!
//! [`mkdir_safe`] builds a directory chain one component at a time, never
//! with a recursive multi-level create: every level that already exists is
//! lstat-verified to be a real directory before the next one is touched,
//! so a symlink planted anywhere in the chain fails the operation instead
//! of silently redirecting the subtree.

use crate::error::{CofferError, Result};
use crate::path::containment::{is_path_contained_in, normalize_lexical};
use std::fs;
use std::path::{Path, PathBuf};

/// Create a directory chain under `root`, verifying every component.
///
/// `dir` may be relative to `root` or an absolute path already under it;
/// anything resolving outside `root` is [`CofferError::PathEscapesRoot`].
/// For each component from `root` downward: an existing component must be
/// a non-symlink directory ([`CofferError::SymlinkRejected`] /
/// [`CofferError::NotADirectory`] otherwise); a missing component is
/// created with a single-level `create_dir`. Losing a create race to a
/// cooperating process is fine — the component is simply re-verified.
///
/// Returns the absolute path of the created (or already existing) leaf.
pub fn mkdir_safe<P: AsRef<Path>>(dir: P, root: &Path) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let root = normalize_lexical(root);

    let candidate = if dir.is_absolute() {
        normalize_lexical(dir)
    } else {
        normalize_lexical(&root.join(dir))
    };

    if !is_path_contained_in(&candidate, &root) {
        return Err(CofferError::PathEscapesRoot {
            path: candidate,
            root,
        });
    }

    verify_real_directory(&root)?;

    // Containment above guarantees the prefix strips.
    let relative = candidate
        .strip_prefix(&root)
        .map_err(|_| CofferError::PathEscapesRoot {
            path: candidate.clone(),
            root: root.clone(),
        })?
        .to_path_buf();

    let mut current = root;
    for component in relative.components() {
        current.push(component);

        match fs::symlink_metadata(&current) {
            Ok(_) => verify_real_directory(&current)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Create exactly this one component; the parent has
                // already been verified.
                match fs::create_dir(&current) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        // Lost a race; whatever appeared must still be a
                        // real directory.
                        verify_real_directory(&current)?;
                    }
                    Err(e) => {
                        return Err(CofferError::io(
                            format!("failed to create directory '{}'", current.display()),
                            e,
                        ));
                    }
                }
            }
            Err(e) => {
                return Err(CofferError::io(
                    format!("failed to lstat '{}'", current.display()),
                    e,
                ));
            }
        }
    }

    Ok(current)
}

/// lstat `path` and require a non-symlink directory.
fn verify_real_directory(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)
        .map_err(|e| CofferError::io(format!("failed to lstat '{}'", path.display()), e))?;

    if metadata.file_type().is_symlink() {
        return Err(CofferError::SymlinkRejected {
            path: path.to_path_buf(),
        });
    }
    if !metadata.is_dir() {
        return Err(CofferError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

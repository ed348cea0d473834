//! Validation of untrusted relative paths against a root directory.
//!
//! [`validate_artifact_path`] is the single entry point through which any
//! caller-supplied relative path must pass before being joined into a
//! filesystem path. It rejects absolute inputs, `..` traversal, lexical
//! escapes, and symlinked or non-directory ancestors.
//!
//! # Residual race
//!
//! Validation is check-time, not use-time. Between a successful validation
//! and the eventual open, an attacker with write access under the root
//! could still substitute a symlink. Callers must therefore open the final
//! file through [`crate::fs::nofollow`] — or use
//! [`open_no_follow_in_root`](crate::fs::nofollow::open_no_follow_in_root),
//! which rechecks the realpath after opening.

use crate::error::{CofferError, Result};
use crate::path::containment::{is_path_contained_in, normalize_lexical};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Validate an untrusted relative path and resolve it under `root`.
///
/// Rejections, in order:
///
/// 1. Empty or absolute input → [`CofferError::PathTraversal`].
/// 2. Normalized form that is `..` or starts with a `..` segment →
///    [`CofferError::PathTraversal`]. A filename merely *containing* `..`
///    (`figure..png`, `..foo.png`) is not traversal and is accepted.
/// 3. Lexical escape of `root` → [`CofferError::PathEscapesRoot`].
/// 4. Any ancestor component below `root` (excluding the final leaf) that
///    is a symlink → [`CofferError::SymlinkRejected`], or that exists but
///    is not a directory → [`CofferError::NotADirectory`]. Components that
///    do not exist yet are fine; the leaf itself is not checked here (the
///    no-follow open covers it).
///
/// On success returns `root.join(normalized)`. The target itself does not
/// need to exist.
pub fn validate_artifact_path<P: AsRef<Path>>(relative: P, root: &Path) -> Result<PathBuf> {
    let relative = relative.as_ref();

    if relative.as_os_str().is_empty() || relative.is_absolute() {
        return Err(CofferError::PathTraversal {
            path: relative.to_path_buf(),
        });
    }

    let normalized = normalize_lexical(relative);

    // Leading ".." survives normalization of relative paths, so a single
    // front check covers both a bare ".." and "figures/../../etc/passwd".
    // A normalized-to-nothing input ("a/..") names the root itself, which
    // is not a valid artifact path either.
    match normalized.components().next() {
        None | Some(Component::ParentDir) => {
            return Err(CofferError::PathTraversal {
                path: relative.to_path_buf(),
            });
        }
        _ => {}
    }

    let candidate = root.join(&normalized);

    if !is_path_contained_in(&candidate, root) {
        return Err(CofferError::PathEscapesRoot {
            path: candidate,
            root: root.to_path_buf(),
        });
    }

    check_ancestors(&normalized, root)?;

    Ok(candidate)
}

/// Walk every ancestor of the leaf from `root` downward, lstat-ing each.
///
/// An intermediate symlink can redirect the whole subtree even when the
/// leaf itself does not exist yet, so each existing component must be a
/// real directory. The walk stops at the first missing component.
fn check_ancestors(normalized: &Path, root: &Path) -> Result<()> {
    let components: Vec<_> = normalized.components().collect();
    let Some((_leaf, ancestors)) = components.split_last() else {
        return Ok(());
    };

    let mut current = root.to_path_buf();
    for component in ancestors {
        current.push(component.as_os_str());

        match fs::symlink_metadata(&current) {
            Ok(metadata) => {
                if metadata.file_type().is_symlink() {
                    return Err(CofferError::SymlinkRejected { path: current });
                }
                if !metadata.is_dir() {
                    return Err(CofferError::NotADirectory { path: current });
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => {
                return Err(CofferError::io(
                    format!("failed to lstat '{}'", current.display()),
                    e,
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_empty_path() {
        let temp_dir = TempDir::new().unwrap();
        let result = validate_artifact_path("", temp_dir.path());
        assert!(matches!(result, Err(CofferError::PathTraversal { .. })));
    }

    #[test]
    fn rejects_absolute_path() {
        let temp_dir = TempDir::new().unwrap();
        let result = validate_artifact_path("/etc/passwd", temp_dir.path());
        assert!(matches!(result, Err(CofferError::PathTraversal { .. })));
    }

    #[test]
    fn rejects_bare_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let result = validate_artifact_path("..", temp_dir.path());
        assert!(matches!(result, Err(CofferError::PathTraversal { .. })));
    }

    #[test]
    fn rejects_traversal_through_existing_subdir() {
        // "figures" really exists; the traversal must still be rejected,
        // and must be rejected lexically (nothing at /etc is consulted).
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("figures")).unwrap();

        let result = validate_artifact_path("figures/../../etc/passwd", temp_dir.path());
        assert!(matches!(result, Err(CofferError::PathTraversal { .. })));
    }

    #[test]
    fn rejects_path_that_normalizes_to_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = validate_artifact_path("figures/..", temp_dir.path());
        assert!(matches!(result, Err(CofferError::PathTraversal { .. })));
    }

    #[test]
    fn accepts_filenames_containing_double_dots() {
        // ".." as a substring of a filename is not traversal.
        let temp_dir = TempDir::new().unwrap();

        for name in ["figure..png", "..foo.png", "archive..tar..gz"] {
            let result = validate_artifact_path(name, temp_dir.path()).unwrap();
            assert_eq!(result, temp_dir.path().join(name));
        }
    }

    #[test]
    fn returns_normalized_join_for_valid_paths() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("figures")).unwrap();

        let result = validate_artifact_path("figures/./plot.png", temp_dir.path()).unwrap();
        assert_eq!(result, temp_dir.path().join("figures").join("plot.png"));
    }

    #[test]
    fn accepts_paths_whose_ancestors_do_not_exist_yet() {
        let temp_dir = TempDir::new().unwrap();

        let result = validate_artifact_path("not/yet/created.txt", temp_dir.path()).unwrap();
        assert_eq!(
            result,
            temp_dir.path().join("not").join("yet").join("created.txt")
        );
    }

    #[test]
    fn internal_parent_dirs_that_stay_inside_are_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let result = validate_artifact_path("a/b/../c.txt", temp_dir.path()).unwrap();
        assert_eq!(result, temp_dir.path().join("a").join("c.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlinked_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let outside = temp_dir.path().join("outside");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("figures")).unwrap();

        let result = validate_artifact_path("figures/plot.png", &root);
        assert!(matches!(result, Err(CofferError::SymlinkRejected { .. })));
    }

    #[test]
    fn rejects_regular_file_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("notes"), b"flat file").unwrap();

        let result = validate_artifact_path("notes/inner.txt", temp_dir.path());
        assert!(matches!(result, Err(CofferError::NotADirectory { .. })));
    }

    #[test]
    fn leaf_symlink_is_not_checked_here() {
        // The leaf is the no-follow accessor's job; validation only walks
        // the ancestors.
        let temp_dir = TempDir::new().unwrap();
        let result = validate_artifact_path("leaf.txt", temp_dir.path()).unwrap();
        assert_eq!(result, temp_dir.path().join("leaf.txt"));
    }
}

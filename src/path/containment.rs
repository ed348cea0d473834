//! Containment checks between a candidate path and a boundary directory.
//!
//! Two strengths are provided:
//!
//! - **Lexical** ([`is_path_contained_in`]): pure path algebra, no
//!   filesystem access. Usable for paths that do not exist yet (e.g. before
//!   creating a directory), but blind to symlinks.
//! - **Symlink-aware** ([`is_path_contained_in_resolved`]): lexical check
//!   plus a realpath resolution of both sides. Required once paths exist,
//!   to catch an intermediate symlink redirecting the subtree. Fails closed:
//!   if either path cannot be resolved the answer is `false`, never an error.

use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically: fold `.` and `..` components without touching
/// the filesystem.
///
/// `..` pops a preceding normal component; at the filesystem root it is
/// dropped (`/..` is `/`); in a relative path with nothing to pop it is
/// kept, so callers can still detect leading traversal after normalization.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {
                    // ".." at the root resolves to the root itself.
                }
                _ => out.push(component.as_os_str()),
            },
            Component::Normal(name) => out.push(name),
        }
    }

    out
}

/// Lexical containment: does `child` equal `parent` or live underneath it?
///
/// Both paths are normalized first, and the comparison is component-wise
/// (`/data/foobar` is *not* inside `/data/foo`). No filesystem access is
/// performed, so this works for paths that do not exist yet — and by the
/// same token it cannot see symlinks.
pub fn is_path_contained_in(child: &Path, parent: &Path) -> bool {
    let child = normalize_lexical(child);
    let parent = normalize_lexical(parent);

    child == parent || child.starts_with(&parent)
}

/// Symlink-aware containment: lexical check, then resolve both paths via
/// realpath and recheck.
///
/// Returns `false` (safe default) rather than an error when either path
/// cannot be resolved — a path that cannot be proven inside the boundary
/// is treated as outside it.
pub fn is_path_contained_in_resolved(child: &Path, parent: &Path) -> bool {
    if !is_path_contained_in(child, parent) {
        return false;
    }

    match (child.canonicalize(), parent.canonicalize()) {
        (Ok(child_real), Ok(parent_real)) => {
            child_real == parent_real || child_real.starts_with(&parent_real)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_folds_curdir_and_parentdir() {
        assert_eq!(
            normalize_lexical(Path::new("/data/./figures/../out")),
            PathBuf::from("/data/out")
        );
        assert_eq!(
            normalize_lexical(Path::new("a/b/../c")),
            PathBuf::from("a/c")
        );
    }

    #[test]
    fn normalize_keeps_leading_parentdir_in_relative_paths() {
        assert_eq!(normalize_lexical(Path::new("..")), PathBuf::from(".."));
        assert_eq!(
            normalize_lexical(Path::new("../escape")),
            PathBuf::from("../escape")
        );
        assert_eq!(
            normalize_lexical(Path::new("figures/../../etc/passwd")),
            PathBuf::from("../etc/passwd")
        );
    }

    #[test]
    fn normalize_clamps_parentdir_at_root() {
        assert_eq!(normalize_lexical(Path::new("/../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize_lexical(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn contained_equal_paths() {
        assert!(is_path_contained_in(Path::new("/data"), Path::new("/data")));
    }

    #[test]
    fn contained_direct_and_nested_children() {
        assert!(is_path_contained_in(
            Path::new("/data/notes.json"),
            Path::new("/data")
        ));
        assert!(is_path_contained_in(
            Path::new("/data/a/b/c"),
            Path::new("/data")
        ));
    }

    #[test]
    fn not_contained_sibling_with_shared_prefix() {
        // String prefix is not component containment.
        assert!(!is_path_contained_in(
            Path::new("/data-evil/file"),
            Path::new("/data")
        ));
        assert!(!is_path_contained_in(
            Path::new("/data/foobar"),
            Path::new("/data/foo")
        ));
    }

    #[test]
    fn not_contained_after_traversal() {
        assert!(!is_path_contained_in(
            Path::new("/data/../etc/passwd"),
            Path::new("/data")
        ));
    }

    #[test]
    fn works_for_nonexistent_paths() {
        assert!(is_path_contained_in(
            Path::new("/no/such/dir/file.txt"),
            Path::new("/no/such/dir")
        ));
    }

    #[test]
    fn resolved_mode_accepts_real_child() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let child = root.join("file.txt");
        std::fs::write(&child, b"x").unwrap();

        assert!(is_path_contained_in_resolved(&child, root));
    }

    #[test]
    fn resolved_mode_fails_closed_for_nonexistent_paths() {
        let temp_dir = TempDir::new().unwrap();
        let child = temp_dir.path().join("missing.txt");

        assert!(!is_path_contained_in_resolved(&child, temp_dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn resolved_mode_catches_symlink_escape() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let outside = temp_dir.path().join("outside");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), b"s").unwrap();

        // root/link -> outside; root/link/secret.txt is lexically inside
        // root but physically outside it.
        let link = root.join("link");
        std::os::unix::fs::symlink(&outside, &link).unwrap();
        let via_link = link.join("secret.txt");

        assert!(is_path_contained_in(&via_link, &root));
        assert!(!is_path_contained_in_resolved(&via_link, &root));
    }
}

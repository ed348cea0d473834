//! Coffer: crash-safe file storage and cross-process locking primitives.
//!
//! This crate is the durable-storage and locking layer that higher-level
//! tools build on. It provides:
//!
//! - Path security: containment checks and validation of untrusted relative
//!   paths against traversal, absolute-path, and symlink escapes
//!   ([`path`]).
//! - Crash-safe writes: same-directory temp file + fsync + atomic rename,
//!   so a reader never observes a partially written target ([`fs::atomic`]).
//! - Symlink-refusing opens (`O_NOFOLLOW` on POSIX) and component-by-component
//!   directory creation ([`fs::nofollow`], [`fs::mkdir`]).
//! - Advisory cross-process locking with stale-lock recovery that survives
//!   crashed holders and PID reuse ([`lock`]).
//!
//! # Concurrency model
//!
//! No threads are spawned here; "concurrency" means contention between
//! independent OS processes over the same lock file or target path. All
//! operations are blocking I/O. The atomic writer guarantees readers see
//! fully-old or fully-new content, but says nothing about which of two
//! racing writers wins; callers needing deterministic single-writer
//! semantics wrap their writes in a [`lock::SessionLock`].

pub mod error;
pub mod fs;
pub mod lock;
pub mod path;
pub mod process;

pub use error::{CofferError, Result};
pub use fs::atomic::{durable_atomic_write, durable_atomic_write_str};
pub use fs::mkdir::mkdir_safe;
pub use fs::nofollow::{
    open_no_follow, open_no_follow_in_root, read_no_follow, read_to_string_no_follow,
};
pub use lock::{ForceBreak, LockInfo, SessionLock, force_break};
pub use path::containment::{is_path_contained_in, is_path_contained_in_resolved};
pub use path::validate::validate_artifact_path;

//! Filesystem primitives for coffer.
//!
//! Crash-safe atomic writes, symlink-refusing opens, and component-checked
//! directory creation. Everything here is blocking I/O; durability comes
//! from fsync + atomic rename, not from in-process coordination.

pub mod atomic;
pub mod mkdir;
pub mod nofollow;

pub use atomic::durable_atomic_write;
pub use atomic::durable_atomic_write_str;
pub use mkdir::mkdir_safe;
pub use nofollow::{open_no_follow, open_no_follow_in_root, read_no_follow, read_to_string_no_follow};

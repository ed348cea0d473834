//! Path security for coffer.
//!
//! This module answers one question in two strengths: "is this path safely
//! inside that directory?" — lexically (usable before anything exists on
//! disk) and symlink-aware (required once paths exist), plus the validation
//! entry point for untrusted relative paths.

pub mod containment;
pub mod validate;

pub use containment::is_path_contained_in;
pub use containment::is_path_contained_in_resolved;
pub use validate::validate_artifact_path;

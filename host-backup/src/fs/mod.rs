//! Path selection and directory traversal.

pub mod pathset;
pub mod walker;

pub use pathset::{resolve, PathSet, PathSpec};
pub use walker::{walk_path_set, EntryKind, FileInfo, WalkWarning};

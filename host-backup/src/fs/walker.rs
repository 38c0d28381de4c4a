//! Directory traversal over a resolved path set.
//!
//! Walks every include root in order, prunes excluded subtrees and reports
//! per-entry problems as warnings instead of aborting.

use super::pathset::PathSet;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// What kind of filesystem object an entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
    /// Sockets, FIFOs, device nodes
    Special,
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Entry type (symlinks are not followed)
    pub kind: EntryKind,
}

/// A path that could not be walked or read. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkWarning {
    pub path: PathBuf,
    pub reason: String,
}

impl WalkWarning {
    pub fn new(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for WalkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

impl FileInfo {
    fn from_entry(entry: &DirEntry) -> Self {
        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Special
        };

        Self {
            path: entry.path().to_path_buf(),
            kind,
        }
    }
}

/// Walk every include root of `set`, calling `callback` for each entry that
/// survives exclusion (directories included, roots included). The walk stops
/// early when the callback breaks.
///
/// Missing roots and unreadable directories are returned as warnings; the
/// walk always continues with the next entry. Entries are visited in file
/// name order so repeated runs over the same tree produce the same sequence.
pub fn walk_path_set<F>(set: &PathSet, mut callback: F) -> Vec<WalkWarning>
where
    F: FnMut(&FileInfo) -> ControlFlow<()>,
{
    let mut warnings = Vec::new();

    for root in set.include_roots() {
        if let Err(e) = std::fs::symlink_metadata(root) {
            warnings.push(WalkWarning::new(root, format!("include root unavailable: {}", e)));
            continue;
        }

        if walk_root(root, set, &mut callback, &mut warnings).is_break() {
            break;
        }
    }

    warnings
}

fn walk_root<F>(
    root: &Path,
    set: &PathSet,
    callback: &mut F,
    warnings: &mut Vec<WalkWarning>,
) -> ControlFlow<()>
where
    F: FnMut(&FileInfo) -> ControlFlow<()>,
{
    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();

    for entry in walker.into_iter().filter_entry(|e| !set.is_excluded(e.path())) {
        match entry {
            Ok(entry) => {
                if callback(&FileInfo::from_entry(&entry)).is_break() {
                    return ControlFlow::Break(());
                }
            }
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                let reason = e
                    .io_error()
                    .map(|io| io.to_string())
                    .unwrap_or_else(|| e.to_string());
                warnings.push(WalkWarning::new(path, reason));
            }
        }
    }

    ControlFlow::Continue(())
}

#[cfg(test)]
fn collect_entries(set: &PathSet) -> (Vec<FileInfo>, Vec<WalkWarning>) {
    let mut entries = Vec::new();
    let warnings = walk_path_set(set, |info| {
        entries.push(info.clone());
        ControlFlow::Continue(())
    });
    (entries, warnings)
}

//! Archive construction and extraction (tar stream, zstd compressed).

pub mod builder;
pub mod extract;

pub use builder::{ArchiveBuilder, BuildReport, BuildStatus, BuildWarning};
pub use extract::{extract, list_members, ExtractReport};

//! Host Backup Library
//!
//! Archives a configured set of host paths into a compressed tarball, ships
//! it to an anonymous file host and remembers where it went so the latest
//! backup can be pulled back and unpacked.

pub mod archive;
pub mod config;
pub mod executor;
pub mod fs;
pub mod pointer;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupSummary, Executor, RestoreSummary};
pub use pointer::{FilePointerStore, PointerStore};
pub use utils::errors::OperationError;

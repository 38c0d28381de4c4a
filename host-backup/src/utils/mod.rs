//! Utility modules for the backup utility.

pub mod errors;
pub mod logger;

pub use errors::{
    ArchiveError, ConfigError, FailureKind, ManifestError, OperationError, PointerError,
    TransferError, EXIT_USAGE,
};

//! Error types for the backup utility.
//!
//! Each component has its own error enum; [`OperationError`] is the
//! orchestration-level taxonomy and carries the process exit code.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a missing/unknown subcommand or an invalid configuration.
pub const EXIT_USAGE: u8 = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid exclude pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("No archive produced at {path}: {reason}")]
    NoArtifact { path: PathBuf, reason: String },

    #[error("Failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed archive: {0}")]
    Malformed(std::io::Error),

    #[error("Failed to unpack {entry}: {source}")]
    Unpack {
        entry: String,
        source: std::io::Error,
    },

    #[error("Archive member escapes the destination: {0}")]
    UnsafeEntry(String),

    #[error("Archive task failed: {0}")]
    Task(String),
}

/// Whether a failed transfer attempt looks like it could succeed on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Terminal,
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Endpoint returned an empty locator")]
    EmptyLocator,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid transfer target: {0}")]
    InvalidTarget(String),
}

impl TransferError {
    /// Classify the failure. The retry loop retries both kinds; the
    /// classification only feeds diagnostics.
    pub fn kind(&self) -> FailureKind {
        match self {
            TransferError::Http(e) if e.is_builder() => FailureKind::Terminal,
            TransferError::Http(_) => FailureKind::Transient,
            TransferError::Status { status, .. } => match *status {
                429 | 500..=599 => FailureKind::Transient,
                _ => FailureKind::Terminal,
            },
            TransferError::EmptyLocator => FailureKind::Terminal,
            TransferError::Io(_) => FailureKind::Transient,
            TransferError::InvalidTarget(_) => FailureKind::Terminal,
        }
    }
}

#[derive(Error, Debug)]
pub enum PointerError {
    #[error("Pointer store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid locator: {0:?}")]
    InvalidLocator(String),
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest command is empty")]
    EmptyCommand,

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Abort reasons of the two top-level operations.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Archive build failed: {0}")]
    BuildFailure(ArchiveError),

    #[error("Upload failed after {attempts} attempts: {last}")]
    UploadFailure { attempts: u32, last: TransferError },

    #[error("Uploaded to {locator} but could not record it: {source}")]
    PointerWriteFailure {
        locator: String,
        source: PointerError,
    },

    #[error("No previous backup has been recorded")]
    NoPriorBackup,

    #[error("Could not read backup pointer: {0}")]
    PointerReadFailure(PointerError),

    #[error("Download failed after {attempts} attempts: {last}")]
    DownloadFailure { attempts: u32, last: TransferError },

    #[error("Extraction failed: {0}")]
    ExtractFailure(ArchiveError),
}

impl OperationError {
    /// Process exit code for this abort reason.
    pub fn exit_code(&self) -> u8 {
        match self {
            OperationError::BuildFailure(_) => 10,
            OperationError::UploadFailure { .. } => 11,
            OperationError::PointerWriteFailure { .. } => 12,
            OperationError::NoPriorBackup => 20,
            OperationError::PointerReadFailure(_) => 21,
            OperationError::DownloadFailure { .. } => 22,
            OperationError::ExtractFailure(_) => 23,
        }
    }

    /// True for "nothing to do yet" rather than "something broke".
    pub fn is_expected_absence(&self) -> bool {
        matches!(self, OperationError::NoPriorBackup)
    }
}

//! Configuration management for the backup utility.
//!
//! Loads configuration from a TOML file. Every section and field is optional
//! and falls back to the defaults below.

use crate::utils::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub archive: ArchiveConfig,
    pub transfer: TransferConfig,
    pub pointer: PointerConfig,
    pub manifest: ManifestConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Absolute include roots, walked in order
    pub include: Vec<PathBuf>,

    /// Glob exclusion patterns matched against full paths
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Fixed artifact path, overwritten on every backup and reused on restore
    pub output: PathBuf,

    /// Directory where metadata entries are staged before archiving
    pub staging_dir: PathBuf,

    /// Compression level (1-22 for zstd)
    pub compression_level: i32,

    /// Artifacts larger than this are flagged, not blocked
    pub warn_size_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// File host base URL; uploads go to `<base_url>/<artifact name>`
    pub base_url: String,

    /// Attempts per transfer, including the first
    pub attempts: u32,

    /// Fixed delay between attempts
    pub retry_delay_secs: u64,

    /// Upper bound on one upload request
    pub upload_timeout_secs: u64,

    /// Upper bound on one download request
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    /// Single-line file holding the last uploaded locator
    pub file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Collect the installed-package listing into the archive
    pub enabled: bool,

    /// Package enumerator argv
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            include: ["/etc", "/home", "/root", "/usr/local", "/opt", "/srv", "/var"]
                .iter()
                .map(PathBuf::from)
                .collect(),
            exclude: [
                "/var/log/*",
                "/var/cache/*",
                "/var/tmp/*",
                "/var/lib/docker/*",
                "*/lost+found",
                "*/.cache/*",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("backup.tar.zst"),
            staging_dir: PathBuf::from("/tmp/host-backup"),
            compression_level: 3,
            warn_size_bytes: 10 * 1024 * 1024 * 1024, // 10 GiB
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            base_url: "https://transfer.sh".to_string(),
            attempts: 3,
            retry_delay_secs: 5,
            upload_timeout_secs: 600,
            download_timeout_secs: 600,
        }
    }
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("last_backup_url.txt"),
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: vec![
                "dpkg-query".to_string(),
                "-W".to_string(),
                "-f=${Package}\t${Version}\n".to_string(),
            ],
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Reject settings no operation can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.include.is_empty() {
            return Err(ConfigError::Invalid("paths.include is empty".into()));
        }
        if self.transfer.attempts == 0 {
            return Err(ConfigError::Invalid("transfer.attempts must be at least 1".into()));
        }
        if self.transfer.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("transfer.base_url is empty".into()));
        }
        Ok(())
    }
}

impl TransferConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

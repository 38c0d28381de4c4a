//! Installed-package manifest collected into each archive.
//!
//! Runs the configured package enumerator and stages its output as a text
//! file that the archiver appends as a metadata entry. Collection is
//! best-effort: the caller logs a failure and carries on without it.

use crate::config::{ArchiveConfig, ManifestConfig};
use crate::utils::ManifestError;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// File name of the staged manifest.
pub const MANIFEST_FILE: &str = "packages.txt";

#[derive(Debug, Clone)]
pub struct PackageManifest {
    command: Vec<String>,
    staging_dir: PathBuf,
}

impl PackageManifest {
    pub fn new(command: Vec<String>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            staging_dir: staging_dir.into(),
        }
    }

    /// `None` when manifest collection is switched off.
    pub fn from_config(manifest: &ManifestConfig, archive: &ArchiveConfig) -> Option<Self> {
        manifest
            .enabled
            .then(|| Self::new(manifest.command.clone(), &archive.staging_dir))
    }

    pub fn output_path(&self) -> PathBuf {
        self.staging_dir.join(MANIFEST_FILE)
    }

    /// Run the enumerator and write its listing to [`Self::output_path`].
    pub fn collect(&self) -> Result<PathBuf, ManifestError> {
        let (program, args) = self.command.split_first().ok_or(ManifestError::EmptyCommand)?;
        let display = self.command.join(" ");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ManifestError::Spawn {
                command: display.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ManifestError::Failed {
                command: display,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let path = self.output_path();
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let header = format!(
            "# Installed packages on {} at {} ({})\n",
            host,
            chrono::Local::now().to_rfc3339(),
            display
        );

        fs::create_dir_all(&self.staging_dir)
            .and_then(|_| {
                let mut content = header.into_bytes();
                content.extend_from_slice(&output.stdout);
                fs::write(&path, content)
            })
            .map_err(|source| ManifestError::Write {
                path: path.clone(),
                source,
            })?;

        let count = output.stdout.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count();
        info!("Collected package manifest ({} entries) at {}", count, path.display());
        Ok(path)
    }
}

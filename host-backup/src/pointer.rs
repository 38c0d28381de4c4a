//! Persistence of the single "last backup" locator.
//!
//! The store holds exactly one record. A missing file and a blank file both
//! read as "no backup yet".

use crate::utils::PointerError;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Read/replace access to the current backup locator.
pub trait PointerStore {
    /// The recorded locator, or `None` when nothing usable is stored.
    fn read(&self) -> Result<Option<String>, PointerError>;

    /// Replace whatever was stored with `locator`.
    fn write(&self, locator: &str) -> Result<(), PointerError>;
}

/// Pointer kept as one line in a text file.
#[derive(Debug, Clone)]
pub struct FilePointerStore {
    path: PathBuf,
}

impl FilePointerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: io::Error) -> PointerError {
        PointerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Sibling temp file the new record is written to before the rename.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "pointer".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PointerStore for FilePointerStore {
    fn read(&self) -> Result<Option<String>, PointerError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let mut lines = content.lines().map(str::trim).filter(|line| !line.is_empty());
                let Some(locator) = lines.next() else {
                    debug!("Pointer file {} is blank", self.path.display());
                    return Ok(None);
                };
                if lines.next().is_some() {
                    warn!(
                        "Pointer file {} holds more than one line; using the first",
                        self.path.display()
                    );
                }
                Ok(Some(locator.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn write(&self, locator: &str) -> Result<(), PointerError> {
        let locator = validate_locator(locator)?;
        let staging = self.staging_path();

        let mut file = fs::File::create(&staging).map_err(|e| self.io_error(e))?;
        file.write_all(locator.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_all())
            .map_err(|e| self.io_error(e))?;
        drop(file);

        fs::rename(&staging, &self.path).map_err(|e| {
            let _ = fs::remove_file(&staging);
            self.io_error(e)
        })?;

        debug!("Recorded backup locator in {}", self.path.display());
        Ok(())
    }
}

/// A storable locator is one non-empty line.
pub fn validate_locator(locator: &str) -> Result<&str, PointerError> {
    let trimmed = locator.trim();
    if trimmed.is_empty() || trimmed.contains(['\n', '\r']) {
        return Err(PointerError::InvalidLocator(locator.to_string()));
    }
    Ok(trimmed)
}

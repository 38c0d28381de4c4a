//! Best-effort archive construction.
//!
//! Produces one zstd-compressed tar stream from a resolved path set plus any
//! metadata files. Per-entry failures are collected as warnings; only the
//! absence of an artifact afterwards counts as a failed build.

use crate::fs::{walk_path_set, EntryKind, FileInfo, PathSet, WalkWarning};
use crate::transfer::progress::format_bytes;
use crate::utils::ArchiveError;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::ops::ControlFlow;
use std::path::{Component, Path, PathBuf};
use tar::{Builder, Header, HeaderMode};
use tracing::{info, warn};

/// Outcome class of a build, decided by artifact existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Clean,
    BuiltWithWarnings,
    NoArtifactProduced,
}

/// Per-entry problem recorded during a build.
pub type BuildWarning = WalkWarning;

#[derive(Debug)]
pub struct BuildReport {
    pub status: BuildStatus,
    pub artifact: PathBuf,
    pub warnings: Vec<BuildWarning>,
    /// Regular files written (metadata entries included)
    pub files: usize,
    /// Uncompressed bytes read from source files
    pub bytes_read: u64,
    /// Size of the artifact on disk (0 when absent)
    pub artifact_size: u64,
    /// Why the stream could not be completed, if it could not
    pub error: Option<String>,
}

impl BuildReport {
    /// Turn a build without artifact into an error; keep everything else.
    pub fn into_result(self) -> Result<Self, ArchiveError> {
        match self.status {
            BuildStatus::NoArtifactProduced => Err(ArchiveError::NoArtifact {
                path: self.artifact,
                reason: self.error.unwrap_or_else(|| "artifact missing after build".to_string()),
            }),
            _ => Ok(self),
        }
    }
}

#[derive(Debug, Default)]
struct BuildStats {
    files: usize,
    bytes_read: u64,
}

/// Writes the archive to a fixed output path, replacing what was there.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    output: PathBuf,
    compression_level: i32,
}

impl ArchiveBuilder {
    pub fn new(output: impl Into<PathBuf>, compression_level: i32) -> Self {
        Self {
            output: output.into(),
            compression_level,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the archive from `set` and append each file in `metadata`.
    ///
    /// Never fails outright: the returned status says whether the artifact
    /// exists and whether anything was skipped on the way.
    pub fn build(&self, set: &PathSet, metadata: &[PathBuf]) -> BuildReport {
        let mut warnings = Vec::new();
        let mut stats = BuildStats::default();

        match fs::remove_file(&self.output) {
            Ok(()) => info!("Removed previous artifact {}", self.output.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Could not remove previous artifact {}: {}", self.output.display(), e);
                warnings.push(BuildWarning::new(&self.output, format!("stale artifact: {}", e)));
            }
        }

        let result = self.write_archive(set, metadata, &mut warnings, &mut stats);

        let artifact_size = match fs::metadata(&self.output) {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            _ => None,
        };

        let error = result.err().map(|e| e.to_string());
        let status = match (artifact_size, &error) {
            (None, _) => BuildStatus::NoArtifactProduced,
            (Some(_), Some(_)) => BuildStatus::BuiltWithWarnings,
            (Some(_), None) if warnings.is_empty() => BuildStatus::Clean,
            (Some(_), None) => BuildStatus::BuiltWithWarnings,
        };

        if let Some(ref e) = error {
            warn!("Archive stream did not complete cleanly: {}", e);
        }

        info!(
            "Archive build finished: {:?}, {} files, {} read, {} warnings, artifact {}",
            status,
            stats.files,
            format_bytes(stats.bytes_read),
            warnings.len(),
            format_bytes(artifact_size.unwrap_or(0)),
        );

        BuildReport {
            status,
            artifact: self.output.clone(),
            warnings,
            files: stats.files,
            bytes_read: stats.bytes_read,
            artifact_size: artifact_size.unwrap_or(0),
            error,
        }
    }

    fn write_archive(
        &self,
        set: &PathSet,
        metadata: &[PathBuf],
        warnings: &mut Vec<BuildWarning>,
        stats: &mut BuildStats,
    ) -> io::Result<()> {
        let file = File::create(&self.output)?;
        let encoder = zstd::Encoder::new(file, self.compression_level)?;
        let mut builder = Builder::new(encoder);
        builder.mode(HeaderMode::Complete);
        builder.follow_symlinks(false);

        // The artifact may sit under an include root
        let own_artifact = fs::canonicalize(&self.output).ok();

        let mut fatal: Option<io::Error> = None;
        let walk_warnings = walk_path_set(set, |info| {
            if own_artifact.as_deref() == Some(info.path.as_path()) {
                return ControlFlow::Continue(());
            }
            match append_entry(&mut builder, info, warnings, stats) {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => {
                    fatal = Some(e);
                    ControlFlow::Break(())
                }
            }
        });
        for warning in walk_warnings {
            warn!("Skipped {}", warning);
            warnings.push(warning);
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        for path in metadata {
            let info = FileInfo {
                path: path.clone(),
                kind: EntryKind::File,
            };
            append_entry(&mut builder, &info, warnings, stats)?;
        }

        let encoder = builder.into_inner()?;
        let mut file = encoder.finish()?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

/// Member name for a source path: the path without its root, so that
/// extracting into `/` puts it back where it was.
pub fn member_name(path: &Path) -> Option<PathBuf> {
    let name: PathBuf = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    if name.as_os_str().is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Append one entry. Source-side problems become warnings and return
/// `Ok`; an `Err` means the archive stream itself could not be written.
fn append_entry<W: Write>(
    builder: &mut Builder<W>,
    info: &FileInfo,
    warnings: &mut Vec<BuildWarning>,
    stats: &mut BuildStats,
) -> io::Result<()> {
    let Some(name) = member_name(&info.path) else {
        return Ok(());
    };

    let mut skip = |reason: String| {
        warn!("Skipped {}: {}", info.path.display(), reason);
        warnings.push(BuildWarning::new(&info.path, reason));
    };

    match info.kind {
        EntryKind::Special => {
            skip("special file not archived".to_string());
            Ok(())
        }
        EntryKind::Dir => {
            let meta = match fs::symlink_metadata(&info.path) {
                Ok(meta) => meta,
                Err(e) => {
                    skip(e.to_string());
                    return Ok(());
                }
            };
            let mut header = Header::new_gnu();
            header.set_metadata_in_mode(&meta, HeaderMode::Complete);
            header.set_size(0);
            builder.append_data(&mut header, &name, io::empty())
        }
        EntryKind::Symlink => {
            let (meta, target) = match fs::symlink_metadata(&info.path)
                .and_then(|meta| fs::read_link(&info.path).map(|target| (meta, target)))
            {
                Ok(pair) => pair,
                Err(e) => {
                    skip(e.to_string());
                    return Ok(());
                }
            };
            let mut header = Header::new_gnu();
            header.set_metadata_in_mode(&meta, HeaderMode::Complete);
            header.set_size(0);
            builder.append_link(&mut header, &name, &target)
        }
        EntryKind::File => {
            let (file, meta) = match File::open(&info.path)
                .and_then(|file| file.metadata().map(|meta| (file, meta)))
            {
                Ok(pair) => pair,
                Err(e) => {
                    skip(e.to_string());
                    return Ok(());
                }
            };
            if !meta.is_file() {
                skip("no longer a regular file".to_string());
                return Ok(());
            }

            let mut header = Header::new_gnu();
            header.set_metadata_in_mode(&meta, HeaderMode::Complete);
            let mut reader = PaddedReader::new(file, meta.len());
            builder.append_data(&mut header, &name, &mut reader)?;

            if let Some(problem) = reader.problem {
                skip(format!("contents incomplete: {}", problem));
            }
            stats.files += 1;
            stats.bytes_read += reader.read;
            Ok(())
        }
    }
}

/// Yields exactly `len` bytes: the file's contents, zero-filled if the file
/// shrinks or a read fails part way, truncated if it grows. Keeps the tar
/// stream consistent with the size already written in the header.
struct PaddedReader<R> {
    inner: R,
    remaining: u64,
    read: u64,
    problem: Option<String>,
}

impl<R: Read> PaddedReader<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
            read: 0,
            problem: None,
        }
    }

    fn fill_zeros(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.remaining as usize);
        buf[..n].fill(0);
        self.remaining -= n as u64;
        n
    }
}

impl<R: Read> Read for PaddedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        if self.problem.is_some() {
            return Ok(self.fill_zeros(buf));
        }

        let limit = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        match self.inner.read(&mut buf[..limit]) {
            Ok(0) => {
                self.problem = Some("file shrank while reading".to_string());
                Ok(self.fill_zeros(buf))
            }
            Ok(n) => {
                self.remaining -= n as u64;
                self.read += n as u64;
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.problem = Some(e.to_string());
                Ok(self.fill_zeros(buf))
            }
        }
    }
}

//! Archive extraction. Unlike building, any failure here is fatal.

use super::builder::member_name;
use crate::utils::ArchiveError;
use nix::sys::time::TimeVal;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, Entry, EntryType};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    /// Members written below the destination
    pub entries: usize,
}

fn open(artifact: &Path) -> Result<Archive<zstd::Decoder<'static, std::io::BufReader<File>>>, ArchiveError> {
    let file = File::open(artifact).map_err(|source| ArchiveError::Open {
        path: artifact.to_path_buf(),
        source,
    })?;
    let decoder = zstd::Decoder::new(file).map_err(ArchiveError::Malformed)?;
    Ok(Archive::new(decoder))
}

/// Unpack `artifact` below `destination`, keeping the recorded member paths.
///
/// Permissions and mtimes are restored, existing files are overwritten and
/// ownership is restored when running as root. A member that would land
/// outside `destination` aborts the extraction.
pub fn extract(artifact: &Path, destination: &Path) -> Result<ExtractReport, ArchiveError> {
    let mut archive = open(artifact)?;
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_preserve_ownerships(nix::unistd::geteuid().is_root());
    archive.set_overwrite(true);

    fs::create_dir_all(destination).map_err(|source| ArchiveError::Unpack {
        entry: destination.display().to_string(),
        source,
    })?;

    info!("Extracting {} into {}", artifact.display(), destination.display());

    let mut entries = 0usize;
    // Directories go last, deepest first, so their modes and mtimes are not
    // disturbed by writing their children.
    let mut directories = Vec::new();
    for entry in archive.entries().map_err(ArchiveError::Malformed)? {
        let mut entry = entry.map_err(ArchiveError::Malformed)?;
        if entry.header().entry_type() == EntryType::Directory {
            directories.push(entry);
            continue;
        }
        unpack_entry(&mut entry, destination)?;
        entries += 1;
    }

    directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
    for mut dir in directories {
        let name = unpack_entry(&mut dir, destination)?;
        restore_dir_mtime(&dir, &name, destination)?;
        entries += 1;
    }

    info!("Extracted {} entries", entries);
    Ok(ExtractReport { entries })
}

fn unpack_entry<R: Read>(entry: &mut Entry<'_, R>, destination: &Path) -> Result<PathBuf, ArchiveError> {
    let path = entry.path().map_err(ArchiveError::Malformed)?.into_owned();
    let name = path.display().to_string();

    match entry.unpack_in(destination) {
        Ok(true) => {
            debug!("Restored {}", name);
            Ok(path)
        }
        Ok(false) => Err(ArchiveError::UnsafeEntry(name)),
        Err(source) => Err(ArchiveError::Unpack { entry: name, source }),
    }
}

/// `tar` sets directory modes but not directory mtimes.
fn restore_dir_mtime<R: Read>(dir: &Entry<'_, R>, path: &Path, destination: &Path) -> Result<(), ArchiveError> {
    let (Ok(mtime), Some(relative)) = (dir.header().mtime(), member_name(path)) else {
        return Ok(());
    };
    let target = destination.join(relative);
    let time = TimeVal::new(mtime as _, 0);

    nix::sys::stat::utimes(&target, &time, &time).map_err(|errno| ArchiveError::Unpack {
        entry: path.display().to_string(),
        source: io::Error::from(errno),
    })
}

/// Member paths of an archive, in stream order.
pub fn list_members(artifact: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut archive = open(artifact)?;
    let mut members = Vec::new();

    for entry in archive.entries().map_err(ArchiveError::Malformed)? {
        let entry = entry.map_err(ArchiveError::Malformed)?;
        let path = entry.path().map_err(ArchiveError::Malformed)?;
        members.push(path.components().collect());
    }

    Ok(members)
}

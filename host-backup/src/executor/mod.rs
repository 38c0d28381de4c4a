//! Backup/restore executor - sequences the two top-level operations.
//!
//! Backup: manifest → path set → archive → upload → pointer.
//! Restore: pointer → download → extract.
//!
//! Each step either continues, degrades with a warning, or aborts the
//! operation with an [`OperationError`]. Nothing is retried across steps;
//! only the transfer client retries internally. Partial progress (an artifact
//! built but not uploaded) is left on disk.

pub mod manifest;

use crate::archive::{self, ArchiveBuilder, BuildReport, BuildStatus, ExtractReport};
use crate::config::Config;
use crate::fs::{resolve, PathSet, PathSpec};
use crate::pointer::PointerStore;
use crate::transfer::progress::{format_bytes, format_duration};
use crate::transfer::{TransferClient, Transport};
use crate::utils::{ArchiveError, ConfigError, OperationError};
use manifest::PackageManifest;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Result of a successful `backup_and_upload`
#[derive(Debug)]
pub struct BackupSummary {
    pub locator: String,
    pub report: BuildReport,
    /// The artifact crossed the configured size threshold
    pub oversized: bool,
    pub duration: Duration,
}

/// Result of a successful `restore_backup`
#[derive(Debug)]
pub struct RestoreSummary {
    pub locator: String,
    pub downloaded_bytes: u64,
    pub extract: ExtractReport,
    pub duration: Duration,
}

/// Runs backups and restores against one transport and one pointer store.
pub struct Executor<T, S> {
    path_set: PathSet,
    builder: ArchiveBuilder,
    manifest: Option<PackageManifest>,
    warn_size_bytes: u64,
    transfer: TransferClient<T>,
    store: S,
}

impl<T: Transport, S: PointerStore> Executor<T, S> {
    /// Build an executor from configuration. Fails on invalid exclude
    /// patterns, before any side effect.
    pub fn new(config: &Config, transfer: TransferClient<T>, store: S) -> Result<Self, ConfigError> {
        let path_set = resolve(PathSpec::from(&config.paths))?;

        Ok(Self {
            path_set,
            builder: ArchiveBuilder::new(&config.archive.output, config.archive.compression_level),
            manifest: PackageManifest::from_config(&config.manifest, &config.archive),
            warn_size_bytes: config.archive.warn_size_bytes,
            transfer,
            store,
        })
    }

    pub fn artifact_path(&self) -> &Path {
        self.builder.output()
    }

    pub fn transfer(&self) -> &TransferClient<T> {
        &self.transfer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Archive the configured paths, upload the artifact and record where
    /// it went.
    pub async fn backup_and_upload(&self) -> Result<BackupSummary, OperationError> {
        let start_time = Instant::now();
        warn_if_unprivileged();

        info!(
            "Starting backup: {} include roots, {} exclude patterns",
            self.path_set.include_roots().len(),
            self.path_set.exclude_patterns().len()
        );

        // 1. Metadata (best-effort)
        let metadata = self.collect_metadata().await;

        // 2-3. Build
        let report = self.build_archive(metadata).await.map_err(|e| {
            error!("Backup aborted: {}", e);
            OperationError::BuildFailure(e)
        })?;

        if report.status == BuildStatus::BuiltWithWarnings {
            warn!(
                "Archive built with {} warnings; continuing with {}",
                report.warnings.len(),
                report.artifact.display()
            );
        }

        // 4. Size check, never blocking
        let oversized = report.artifact_size > self.warn_size_bytes;
        if oversized {
            warn!(
                "Artifact is {} (threshold {}); the file host may reject it",
                format_bytes(report.artifact_size),
                format_bytes(self.warn_size_bytes)
            );
        }

        // 5. Upload
        let locator = self.transfer.upload(&report.artifact).await.map_err(|e| {
            error!("Backup aborted, artifact left at {}", report.artifact.display());
            OperationError::UploadFailure {
                attempts: e.attempts,
                last: e.last,
            }
        })?;
        info!("Uploaded {} to {}", format_bytes(report.artifact_size), locator);

        // 6. Record
        if let Err(source) = self.store.write(&locator) {
            error!("Backup uploaded to {} but the locator could not be saved: {}", locator, source);
            return Err(OperationError::PointerWriteFailure { locator, source });
        }

        let duration = start_time.elapsed();
        info!("Backup completed in {}", format_duration(duration.as_secs()));

        Ok(BackupSummary {
            locator,
            report,
            oversized,
            duration,
        })
    }

    /// Fetch the last recorded backup and unpack it under `destination`
    /// (normally `/`).
    pub async fn restore_backup(&self, destination: &Path) -> Result<RestoreSummary, OperationError> {
        let start_time = Instant::now();
        warn_if_unprivileged();

        // 1. Pointer
        let locator = match self.store.read() {
            Ok(Some(locator)) => locator,
            Ok(None) => {
                info!("No previous backup recorded; nothing to restore");
                return Err(OperationError::NoPriorBackup);
            }
            Err(e) => {
                error!("Restore aborted: {}", e);
                return Err(OperationError::PointerReadFailure(e));
            }
        };
        info!("Restoring backup from {}", locator);

        // 2. Download
        let artifact = self.builder.output().to_path_buf();
        let downloaded_bytes = self.transfer.download(&locator, &artifact).await.map_err(|e| {
            error!("Restore aborted: download of {} failed", locator);
            OperationError::DownloadFailure {
                attempts: e.attempts,
                last: e.last,
            }
        })?;

        // 3. Extract
        let extract = extract_blocking(artifact, destination.to_path_buf())
            .await
            .map_err(|e| {
                error!("Restore aborted: {}", e);
                OperationError::ExtractFailure(e)
            })?;

        let duration = start_time.elapsed();
        info!(
            "Restore completed: {} entries in {}",
            extract.entries,
            format_duration(duration.as_secs())
        );

        Ok(RestoreSummary {
            locator,
            downloaded_bytes,
            extract,
            duration,
        })
    }

    async fn collect_metadata(&self) -> Vec<PathBuf> {
        let Some(manifest) = self.manifest.clone() else {
            return Vec::new();
        };

        match tokio::task::spawn_blocking(move || manifest.collect()).await {
            Ok(Ok(path)) => vec![path],
            Ok(Err(e)) => {
                warn!("Package manifest not collected: {}", e);
                Vec::new()
            }
            Err(e) => {
                warn!("Package manifest task failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn build_archive(&self, metadata: Vec<PathBuf>) -> Result<BuildReport, ArchiveError> {
        let builder = self.builder.clone();
        let path_set = self.path_set.clone();

        // Directory walk and compression are blocking
        tokio::task::spawn_blocking(move || builder.build(&path_set, &metadata))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))?
            .into_result()
    }
}

async fn extract_blocking(artifact: PathBuf, destination: PathBuf) -> Result<ExtractReport, ArchiveError> {
    tokio::task::spawn_blocking(move || archive::extract(&artifact, &destination))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

fn warn_if_unprivileged() {
    if !nix::unistd::geteuid().is_root() {
        warn!("Not running as root; system paths may be skipped or left unrestored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::builder::member_name;
    use crate::archive::list_members;
    use crate::pointer::FilePointerStore;
    use crate::transfer::RetryPolicy;
    use crate::utils::{PointerError, TransferError};
    use std::cell::RefCell;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fake file host: keeps uploaded artifacts in memory.
    #[derive(Default)]
    struct FakeHost {
        stored: Mutex<Vec<Vec<u8>>>,
        puts: Mutex<u32>,
        gets: Mutex<u32>,
        fail_puts: bool,
        fail_gets: bool,
        locator: Option<String>,
    }

    impl Transport for FakeHost {
        async fn put_file(&self, url: &str, path: &Path, _timeout: Duration) -> Result<String, TransferError> {
            *self.puts.lock().unwrap() += 1;
            if self.fail_puts {
                return Err(TransferError::Status { status: 502, body: String::new() });
            }
            let bytes = fs::read(path)?;
            let mut stored = self.stored.lock().unwrap();
            stored.push(bytes);
            Ok(self
                .locator
                .clone()
                .unwrap_or_else(|| format!("{}?id={}\n", url, stored.len() - 1)))
        }

        async fn get_to_file(&self, url: &str, path: &Path, _timeout: Duration) -> Result<u64, TransferError> {
            *self.gets.lock().unwrap() += 1;
            if self.fail_gets {
                return Err(TransferError::Status { status: 503, body: String::new() });
            }
            let id: usize = url
                .rsplit("id=")
                .next()
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| TransferError::Status { status: 404, body: String::new() })?;
            let stored = self.stored.lock().unwrap();
            let bytes = stored
                .get(id)
                .ok_or_else(|| TransferError::Status { status: 404, body: String::new() })?;
            fs::write(path, bytes)?;
            Ok(bytes.len() as u64)
        }
    }

    /// In-memory pointer store.
    #[derive(Default)]
    struct MemoryStore {
        value: RefCell<Option<String>>,
        fail_writes: bool,
    }

    impl PointerStore for MemoryStore {
        fn read(&self) -> Result<Option<String>, PointerError> {
            Ok(self.value.borrow().clone())
        }

        fn write(&self, locator: &str) -> Result<(), PointerError> {
            if self.fail_writes {
                return Err(PointerError::Io {
                    path: PathBuf::from("memory"),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            *self.value.borrow_mut() = Some(locator.to_string());
            Ok(())
        }
    }

    struct Fixture {
        src: TempDir,
        work: TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let src = TempDir::new().unwrap();
            let work = TempDir::new().unwrap();
            fs::create_dir_all(src.path().join("etc")).unwrap();
            fs::create_dir_all(src.path().join("log")).unwrap();
            fs::write(src.path().join("etc/app.conf"), b"port = 8080\n").unwrap();
            fs::write(src.path().join("log/app.log"), b"noise").unwrap();

            let mut config = Config::default();
            config.paths.include = vec![src.path().to_path_buf()];
            config.paths.exclude = vec!["log/*".to_string()];
            config.archive.output = work.path().join("backup.tar.zst");
            config.archive.staging_dir = work.path().join("staging");
            config.manifest.command = vec!["sh".into(), "-c".into(), "echo 'bash 5.2'".into()];
            config.transfer.base_url = "https://files.example".into();

            Self { src, work, config }
        }

        fn executor<S: PointerStore>(&self, host: FakeHost, store: S) -> Executor<FakeHost, S> {
            let transfer = TransferClient::new(host, &self.config.transfer);
            Executor::new(&self.config, transfer, store).unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_uploads_and_records_locator() {
        let fixture = Fixture::new();
        let executor = fixture.executor(FakeHost::default(), MemoryStore::default());

        let summary = executor.backup_and_upload().await.unwrap();

        assert_eq!(summary.locator, "https://files.example/backup.tar.zst?id=0");
        assert_eq!(executor.store().read().unwrap().as_deref(), Some(summary.locator.as_str()));
        assert_eq!(summary.report.status, BuildStatus::Clean);
        assert!(!summary.oversized);

        let members = list_members(executor.artifact_path()).unwrap();
        let root = member_name(fixture.src.path()).unwrap();
        assert!(members.contains(&root.join("etc/app.conf")));
        assert!(!members.contains(&root.join("log/app.log")));
        // package manifest rides along
        let staged = fixture.work.path().join("staging").join(manifest::MANIFEST_FILE);
        assert!(members.contains(&member_name(&staged).unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manifest_failure_is_not_fatal() {
        let mut fixture = Fixture::new();
        fixture.config.manifest.command = vec!["definitely-not-a-package-tool".into()];
        let executor = fixture.executor(FakeHost::default(), MemoryStore::default());

        let summary = executor.backup_and_upload().await.unwrap();
        assert_eq!(summary.report.status, BuildStatus::Clean);
        assert!(executor.store().read().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_artifact_still_uploads() {
        let mut fixture = Fixture::new();
        fixture.config.archive.warn_size_bytes = 1;
        let executor = fixture.executor(FakeHost::default(), MemoryStore::default());

        let summary = executor.backup_and_upload().await.unwrap();
        assert!(summary.oversized);
        assert_eq!(*executor.transfer().transport().puts.lock().unwrap(), 1);
        assert!(executor.store().read().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_failure_skips_upload() {
        let mut fixture = Fixture::new();
        fixture.config.archive.output = fixture.work.path().join("missing/backup.tar.zst");
        let executor = fixture.executor(FakeHost::default(), MemoryStore::default());

        let err = executor.backup_and_upload().await.unwrap_err();
        assert!(matches!(err, OperationError::BuildFailure(ArchiveError::NoArtifact { .. })));
        assert_eq!(err.exit_code(), 10);
        assert_eq!(*executor.transfer().transport().puts.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_exhaustion_keeps_old_pointer_and_artifact() {
        let fixture = Fixture::new();
        let store = MemoryStore::default();
        store.write("https://files.example/previous").unwrap();
        let host = FakeHost {
            fail_puts: true,
            ..Default::default()
        };
        let executor = fixture.executor(host, store);

        let err = executor.backup_and_upload().await.unwrap_err();
        assert!(matches!(err, OperationError::UploadFailure { attempts: 3, .. }));
        assert_eq!(err.exit_code(), 11);
        assert_eq!(*executor.transfer().transport().puts.lock().unwrap(), 3);
        assert_eq!(
            executor.store().read().unwrap().as_deref(),
            Some("https://files.example/previous")
        );
        assert!(executor.artifact_path().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_locator_is_upload_failure() {
        let fixture = Fixture::new();
        let host = FakeHost {
            locator: Some("\n".into()),
            ..Default::default()
        };
        let executor = fixture.executor(host, MemoryStore::default());

        let err = executor.backup_and_upload().await.unwrap_err();
        assert!(matches!(err, OperationError::UploadFailure { last: TransferError::EmptyLocator, .. }));
        assert_eq!(executor.store().read().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pointer_write_failure_reports_locator() {
        let fixture = Fixture::new();
        let store = MemoryStore {
            fail_writes: true,
            ..Default::default()
        };
        let executor = fixture.executor(FakeHost::default(), store);

        match executor.backup_and_upload().await {
            Err(e @ OperationError::PointerWriteFailure { .. }) => {
                assert_eq!(e.exit_code(), 12);
                assert!(e.to_string().contains("https://files.example/backup.tar.zst?id=0"));
            }
            other => panic!("unexpected result: {:?}", other.map(|s| s.locator)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_without_pointer_is_expected_absence() {
        let fixture = Fixture::new();

        // Missing file and blank file behave the same
        let pointer = fixture.work.path().join("last_backup_url.txt");
        let missing = fixture.executor(FakeHost::default(), FilePointerStore::new(&pointer));
        let err_missing = missing.restore_backup(fixture.work.path()).await.unwrap_err();

        fs::write(&pointer, "   \n").unwrap();
        let blank = fixture.executor(FakeHost::default(), FilePointerStore::new(&pointer));
        let err_blank = blank.restore_backup(fixture.work.path()).await.unwrap_err();

        for err in [&err_missing, &err_blank] {
            assert!(matches!(err, OperationError::NoPriorBackup));
            assert!(err.is_expected_absence());
        }
        assert_eq!(err_missing.exit_code(), err_blank.exit_code());
        assert_eq!(*missing.transfer().transport().gets.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_then_restore_round_trip() {
        let fixture = Fixture::new();
        let pointer = fixture.work.path().join("last_backup_url.txt");
        let executor = fixture.executor(FakeHost::default(), FilePointerStore::new(&pointer));

        let backup = executor.backup_and_upload().await.unwrap();
        fs::remove_file(executor.artifact_path()).unwrap();

        let destination = TempDir::new().unwrap();
        let restore = executor.restore_backup(destination.path()).await.unwrap();

        assert_eq!(restore.locator, backup.locator);
        assert_eq!(restore.downloaded_bytes, backup.report.artifact_size);
        let restored_root = destination.path().join(member_name(fixture.src.path()).unwrap());
        assert_eq!(fs::read(restored_root.join("etc/app.conf")).unwrap(), b"port = 8080\n");
        assert!(!restored_root.join("log/app.log").exists());
        assert_eq!(*executor.transfer().transport().gets.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_exhaustion() {
        let fixture = Fixture::new();
        let store = MemoryStore::default();
        store.write("https://files.example/backup.tar.zst?id=0").unwrap();
        let host = FakeHost {
            fail_gets: true,
            ..Default::default()
        };
        let executor = fixture.executor(host, store);

        let err = executor.restore_backup(fixture.work.path()).await.unwrap_err();
        assert!(matches!(err, OperationError::DownloadFailure { attempts: 3, .. }));
        assert_eq!(err.exit_code(), 22);
        assert_eq!(*executor.transfer().transport().gets.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_download_is_extract_failure() {
        let fixture = Fixture::new();
        let host = FakeHost::default();
        host.stored.lock().unwrap().push(b"<html>expired</html>".to_vec());
        let store = MemoryStore::default();
        store.write("https://files.example/backup.tar.zst?id=0").unwrap();
        let executor = fixture.executor(host, store);

        let destination = TempDir::new().unwrap();
        let err = executor.restore_backup(destination.path()).await.unwrap_err();
        assert!(matches!(err, OperationError::ExtractFailure(_)));
        assert_eq!(err.exit_code(), 23);
    }

    #[test]
    fn test_invalid_exclude_pattern_is_config_error() {
        let mut fixture = Fixture::new();
        fixture.config.paths.exclude.push("[broken".into());
        let transfer = TransferClient::new(FakeHost::default(), &fixture.config.transfer)
            .with_policy(RetryPolicy::default());

        let result = Executor::new(&fixture.config, transfer, MemoryStore::default());
        assert!(matches!(result, Err(ConfigError::Pattern { .. })));
    }
}

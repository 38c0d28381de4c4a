//! Host Backup - Main entry point
//!
//! Two operations: `backup_and_upload` and `restore_backup`.

use clap::{Parser, Subcommand};
use host_backup::transfer::{HttpTransport, TransferClient};
use host_backup::utils::{self, EXIT_USAGE};
use host_backup::{Config, Executor, FilePointerStore};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive the configured paths, upload the artifact and record its locator
    #[command(name = "backup_and_upload", alias = "backup")]
    BackupAndUpload,

    /// Download the last recorded backup and unpack it
    #[command(name = "restore_backup", alias = "restore")]
    RestoreBackup {
        /// Directory the archive is unpacked into
        #[arg(short, long, value_name = "DIR", default_value = "/")]
        destination: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_exit_code(&e));
        }
    };

    // Load configuration
    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("host-backup: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    if let Err(e) = utils::logger::init(log_level) {
        eprintln!("host-backup: failed to initialize logging: {}", e);
    }

    tracing::info!("Starting host-backup v{}", env!("CARGO_PKG_VERSION"));

    let transport = match HttpTransport::new() {
        Ok(transport) => transport,
        Err(e) => {
            tracing::error!("Failed to create HTTP client: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };
    let transfer = TransferClient::new(transport, &config.transfer);
    let store = FilePointerStore::new(&config.pointer.file);

    let executor = match Executor::new(&config, transfer, store) {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let result = match args.command {
        Command::BackupAndUpload => executor.backup_and_upload().await.map(|summary| {
            println!("{}", summary.locator);
        }),
        Command::RestoreBackup { destination } => {
            executor.restore_backup(&destination).await.map(|summary| {
                tracing::info!(
                    "Restored {} entries from {} into {}",
                    summary.extract.entries,
                    summary.locator,
                    destination.display()
                );
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_expected_absence() => {
            tracing::warn!("{}", e);
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Exit code for an argument error; `--help` and `--version` are not failures.
fn parse_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        EXIT_USAGE
    } else {
        0
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, utils::ConfigError> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit_code_for(argv: &[&str]) -> Option<u8> {
        Args::try_parse_from(argv).err().map(|e| parse_exit_code(&e))
    }

    #[test]
    fn test_bad_usage_exits_with_usage_code() {
        assert_eq!(exit_code_for(&["host-backup"]), Some(EXIT_USAGE));
        assert_eq!(exit_code_for(&["host-backup", "frobnicate"]), Some(EXIT_USAGE));
        assert_eq!(exit_code_for(&["host-backup", "backup", "--bogus"]), Some(EXIT_USAGE));
    }

    #[test]
    fn test_help_and_version_exit_zero() {
        assert_eq!(exit_code_for(&["host-backup", "--help"]), Some(0));
        assert_eq!(exit_code_for(&["host-backup", "--version"]), Some(0));
    }

    #[test]
    fn test_subcommands_and_aliases() {
        let args = Args::try_parse_from(["host-backup", "backup_and_upload"]).unwrap();
        assert!(matches!(args.command, Command::BackupAndUpload));

        let args = Args::try_parse_from(["host-backup", "restore", "-c", "/etc/host-backup.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/host-backup.toml")));
        match args.command {
            Command::RestoreBackup { destination } => assert_eq!(destination, PathBuf::from("/")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_file_is_usage_error() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, utils::ConfigError::Read { .. }));
    }
}

use backup_notifier::backup::backup_config::BackupConfig;
use backup_notifier::backup::backup_type::BackupType;
use backup_notifier::backup::check::HealthCheck;
use backup_notifier::backup::pipeline::BackupPipeline;
use backup_notifier::backup::result_error::error::Error;
use backup_notifier::backup::result_error::result::Result;
use backup_notifier::backup::schedule::{log_report, start_loop};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Back up a database and/or a storage directory to a remote collector
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump the database, encrypt it and upload it
    DatabaseBackup,
    /// Archive the storage directory and upload it
    StorageBackup,
    /// Check configuration, tools and connectivity
    Check,
    /// Run the configured backups on the cron schedule
    Daemon,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let res = BackupConfig::load(&args.config).and_then(|config| run(&config, &args.command));

    match res {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}

/// `Ok(false)` when the command completed but reported a problem.
fn run(config: &BackupConfig, command: &Command) -> Result<bool> {
    match command {
        Command::DatabaseBackup => single_backup(config, BackupType::Database),
        Command::StorageBackup => single_backup(config, BackupType::Storage),
        Command::Check => {
            let report = HealthCheck::system(config)?.run();
            println!("{report}");
            Ok(report.is_ok())
        }
        Command::Daemon => {
            let cron = config
                .cron()
                .as_deref()
                .ok_or_else(|| Error::Config("cron is required for daemon mode".into()))?;
            start_loop(&BackupPipeline::from_config(config)?, cron)?;
            error!("Loop should never break without error");
            Ok(false)
        }
    }
}

fn single_backup(config: &BackupConfig, backup_type: BackupType) -> Result<bool> {
    let missing = config
        .missing_variables()
        .into_iter()
        .filter(|name| backup_type == BackupType::Storage || *name != "BACKUP_ZIP_PASSWORD")
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(Error::Config(format!(
            "Missing required configuration: {}",
            missing.join(", ")
        )));
    }

    let report = BackupPipeline::from_config(config)?.run(backup_type, Utc::now())?;
    log_report(&report);
    Ok(true)
}

//! dbsnap CLI - portable schema-and-data snapshots of relational databases.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dbsnap::{
    AccessMode, BackupOptions, Config, FileSnapshot, RestoreOrchestrator, SnapshotBuilder,
    SnapshotError, UrlConnector, ValueCoercer,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "dbsnap")]
#[command(about = "Back up and restore relational databases as portable JSON snapshots")]
#[command(version)]
struct Cli {
    /// Path to an optional YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json [default: text]
    #[arg(long)]
    log_format: Option<String>,

    /// Log verbosity: trace, debug, info, warn, error [default: info]
    #[arg(long)]
    verbosity: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture every table of a database into a snapshot file
    #[command(disable_version_flag = true)]
    Backup {
        /// Database URL (e.g. sqlite://app.db)
        #[arg(long, env = "DBSNAP_DB_URL")]
        db_url: Option<String>,

        /// Snapshot file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Also record foreign-key relationships per table
        #[arg(long)]
        include_relationships: bool,

        /// Snapshot version tag; must start with major 1 [default: 1.0]
        #[arg(long = "version", value_name = "VERSION")]
        tag: Option<String>,
    },

    /// Rebuild a database from a snapshot file
    Restore {
        /// Database URL (e.g. sqlite://app.db); the file is created if missing
        #[arg(long, env = "DBSNAP_DB_URL")]
        db_url: Option<String>,

        /// Snapshot file to read
        #[arg(short, long)]
        input: PathBuf,

        /// Total restore attempts when the database is locked [default: 5]
        #[arg(long)]
        max_retries: Option<u32>,

        /// Seconds to wait between attempts [default: 5]
        #[arg(long)]
        retry_delay: Option<u64>,

        /// Seconds SQLite waits on a lock before giving up [default: 30]
        #[arg(long)]
        busy_timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SnapshotError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(verbosity) = cli.verbosity {
        config.logging.verbosity = verbosity;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    match cli.command {
        Commands::Backup {
            db_url,
            output,
            include_relationships,
            tag,
        } => {
            if let Some(url) = db_url {
                config.database.url = Some(url);
            }
            if include_relationships {
                config.backup.include_relationships = true;
            }
            if let Some(tag) = tag {
                config.backup.version = tag;
            }
            config.validate()?;
            setup_logging(&config.logging.verbosity, &config.logging.format)
                .map_err(SnapshotError::Config)?;
            if let Some(path) = &cli.config {
                info!("Loaded configuration from {:?}", path);
            }

            let connector = UrlConnector::new(database_url(&config)?, AccessMode::ReadOnly)?
                .with_busy_timeout(config.database.busy_timeout());
            let options = BackupOptions {
                include_relationships: config.backup.include_relationships,
                version: config.backup.version.clone(),
            };

            let result = SnapshotBuilder::new(Arc::new(connector))
                .with_options(options)
                .run(&FileSnapshot::new(&output))
                .await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nBackup completed!");
                println!("  Output: {}", output.display());
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}", result.tables);
                println!("  Rows: {}", result.rows);
                println!("  Bytes: {}", result.bytes);
                println!("  SHA-256: {}", result.sha256);
            }
        }

        Commands::Restore {
            db_url,
            input,
            max_retries,
            retry_delay,
            busy_timeout,
        } => {
            if let Some(url) = db_url {
                config.database.url = Some(url);
            }
            if let Some(n) = max_retries {
                config.restore.max_retries = n;
            }
            if let Some(secs) = retry_delay {
                config.restore.retry_delay_secs = secs;
            }
            if let Some(secs) = busy_timeout {
                config.database.busy_timeout_secs = secs;
            }
            config.validate()?;
            setup_logging(&config.logging.verbosity, &config.logging.format)
                .map_err(SnapshotError::Config)?;
            if let Some(path) = &cli.config {
                info!("Loaded configuration from {:?}", path);
            }

            let connector = UrlConnector::new(database_url(&config)?, AccessMode::ReadWrite)?
                .with_busy_timeout(config.database.busy_timeout());
            let coercer =
                ValueCoercer::default().with_datetime_formats(&config.restore.datetime_formats);

            let result = RestoreOrchestrator::new(
                Arc::new(connector),
                Arc::new(FileSnapshot::new(&input)),
            )
            .with_retry_policy(config.restore.retry_policy())
            .with_coercer(coercer)
            .run()
            .await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nRestore completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Attempts: {}", result.attempts);
                println!("  Tables: {}", result.tables.len());
                println!("  Rows: {}", result.rows);
                if !result.warnings.is_empty() {
                    println!("  Warnings:");
                    for warning in &result.warnings {
                        println!("    - {}", warning);
                    }
                }
            }
        }
    }

    Ok(())
}

fn database_url(config: &Config) -> Result<String, SnapshotError> {
    config.database.url.clone().ok_or_else(|| {
        SnapshotError::Config("--db-url is required (or database.url in the config file)".into())
    })
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    // Logs go to stderr so stdout carries only the result.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

//! # Offsite CLI - Personal Backup Pipeline
//!
//! A command-line interface for the offsite backup library.
//!
//! ## Features
//! - Archive files and directories into gzip/tar-gzip artifacts
//! - Optionally encrypt artifacts with a password before upload
//! - Ship artifacts to a cloud media API or a local directory store
//! - Record every upload in a CSV manifest
//! - Retrieve, decrypt and restore previously uploaded backups
//!
//! ## Usage
//! ```bash
//! # Back up the locations listed in a file
//! offsite locations.txt
//!
//! # Back up locations read from standard input, encrypted
//! echo ~/documents | offsite --encrypt
//!
//! # Retrieve everything recorded in the manifest
//! offsite --retrieve
//!
//! # Keep artifacts in a local directory instead of the cloud
//! offsite locations.txt --store /mnt/external/backups
//! ```

use clap::Parser;
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use offsite::utils::format_bytes;
use offsite::{
    config, locations, BackupOptions, BackupPipeline, BlobStore, CloudStore, Credentials,
    DirStore, Result, RetrieveOptions,
};

/// Offsite CLI - archive, encrypt and upload backups of local locations
#[derive(Parser)]
#[command(name = "offsite")]
#[command(version)]
#[command(about = "Archive, encrypt and ship backups of files and directories offsite")]
#[command(long_about = None)]
struct Cli {
    /// File listing the locations to back up, one per line (defaults to standard input)
    file: Option<PathBuf>,

    /// Retrieve the backups recorded in the manifest instead of generating new ones
    #[arg(short, long)]
    retrieve: bool,

    /// Encrypt artifacts with the configured password before upload
    #[arg(short, long, conflicts_with = "retrieve")]
    encrypt: bool,

    /// Keep artifacts in a local directory instead of the cloud API
    #[arg(long, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Manifest file recording uploaded backups
    #[arg(long, value_name = "FILE", default_value = "reports/summary.csv")]
    manifest: PathBuf,

    /// Environment file holding the credentials (defaults to .env when present)
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Disable colors if requested
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        tracing::error!(stage = e.stage(), "{}", e);
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Initializes tracing with a dated log file under `logs/` and, in verbose
/// mode, a console layer on stderr. Console output otherwise stays reserved
/// for the colored command summaries.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let file_layer = open_log_file().map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::sync::Arc::new(file))
    });

    let console_layer =
        verbose.then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();
}

/// Opens (appending) today's log file, e.g. `logs/2026-08-22.log`.
///
/// Returns `None` when the directory or file cannot be created; the run
/// proceeds without file logging rather than failing.
fn open_log_file() -> Option<std::fs::File> {
    let dir = Path::new("logs");
    std::fs::create_dir_all(dir).ok()?;
    let name = format!("{}.log", chrono::Local::now().format("%Y-%m-%d"));
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(name))
        .ok()
}

fn run(cli: Cli) -> Result<()> {
    load_env(cli.env_file.as_deref())?;
    let credentials = Credentials::from_env()?;

    let store: Box<dyn BlobStore> = match &cli.store {
        Some(dir) => Box::new(DirStore::new(dir)?),
        None => Box::new(CloudStore::new(&credentials)?),
    };
    let pipeline = BackupPipeline::new(store.as_ref(), &credentials);

    if cli.retrieve {
        cmd_retrieve(&pipeline, &cli)
    } else {
        cmd_backup(&pipeline, &cli)
    }
}

/// Loads the environment file the credentials come from.
///
/// An explicitly passed `--env-file` must exist; the default `.env` is
/// loaded only when present so the variables can also come from the
/// process environment.
fn load_env(env_file: Option<&Path>) -> Result<()> {
    match env_file {
        Some(path) => config::load_env_file(path),
        None => {
            let default = Path::new(".env");
            if default.exists() {
                config::load_env_file(default)
            } else {
                Ok(())
            }
        }
    }
}

fn cmd_backup(pipeline: &BackupPipeline<'_>, cli: &Cli) -> Result<()> {
    let locations = locations::read_locations(cli.file.as_deref())?;

    println!("{}", "Generating backups...".blue().bold());

    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(format!("Backing up {} locations...", locations.len()));

    let options = BackupOptions {
        encrypt: cli.encrypt,
        manifest_path: cli.manifest.clone(),
    };
    let report = pipeline.run(&locations, &options)?;

    pb.finish_and_clear();

    let duration = start.elapsed();

    println!(
        "{} Backed up {} locations",
        "✓".green().bold(),
        report.locations.to_string().yellow().bold()
    );
    println!("  Artifacts: {}", report.uploaded.to_string().cyan());
    println!("  Source: {}", format_bytes(report.source_bytes).cyan());
    println!("  Uploaded: {}", format_bytes(report.uploaded_bytes).cyan());
    if report.encrypted {
        println!("  Encrypted: {}", "yes".cyan());
    }
    println!(
        "  Manifest: {}",
        cli.manifest.display().to_string().cyan()
    );
    println!("  Time: {}", format_duration(duration).to_string().cyan());

    Ok(())
}

fn cmd_retrieve(pipeline: &BackupPipeline<'_>, cli: &Cli) -> Result<()> {
    println!("{}", "Retrieving backups...".blue().bold());

    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message("Downloading artifacts...");

    let options = RetrieveOptions {
        manifest_path: cli.manifest.clone(),
        ..Default::default()
    };
    let report = pipeline.retrieve(&options)?;

    pb.finish_and_clear();

    println!(
        "{} Retrieved {} backups",
        "✓".green().bold(),
        report.entries.to_string().yellow().bold()
    );
    println!(
        "  Downloaded: {}",
        format_bytes(report.downloaded_bytes).cyan()
    );
    println!("  Restored: {}", report.restored.to_string().cyan());
    println!(
        "  Into: {}",
        options.download_dir.display().to_string().cyan()
    );
    println!(
        "  Time: {}",
        format_duration(start.elapsed()).to_string().cyan()
    );

    Ok(())
}

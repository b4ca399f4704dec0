//! # Cairn CLI - Deduplicating Backups
//!
//! Command-line interface for the Cairn backup library.
//!
//! ## Features
//! - Create a repository with a chosen hash algorithm
//! - Back up files and directories, optionally under a name
//! - Restore a backup by name and date
//! - Verify every stored blob
//! - List snapshots, as text or JSON
//!
//! ## Usage
//! ```bash
//! # Create a repository
//! cairn -r /mnt/backup init --sum sha256
//!
//! # Back up two directories under the name "home"
//! cairn -r /mnt/backup backup ~/docs ~/photos -n home
//!
//! # Restore the first backup of a day
//! cairn -r /mnt/backup restore -n home -d 2024-03-01 /tmp/restored
//!
//! # Verify the repository
//! cairn -r /mnt/backup check
//! ```

use cairn::utils::format_bytes;
use cairn::{
    BackupGroup, BackupOptions, HashAlgorithm, IssueKind, Repository, RepositoryBuilder, Result,
    DEFAULT_BUFFER_SIZE,
};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Cairn CLI - deduplicating backups in a content-addressed repository
#[derive(Parser)]
#[command(name = "cairn")]
#[command(version)]
#[command(about = "Deduplicating backups - store every file content once, restore any snapshot")]
#[command(long_about = None)]
struct Cli {
    /// Repository path
    #[arg(short, long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Log and skip failing files instead of aborting
    #[arg(long, global = true)]
    omit_errors: bool,

    /// Increase log verbosity (-v warn, -vv info, -vvv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Worker threads (defaults to the number of logical CPUs)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    /// Read buffer size per worker, in bytes
    #[arg(short, long, global = true, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new repository
    Init {
        /// Hash algorithm (md5, sha1, sha256, sha512, sha3-256, sha3-512)
        #[arg(long, default_value = "sha256")]
        sum: String,
    },

    /// Back up files and directories
    #[command(alias = "b")]
    Backup {
        /// Files and directories to back up
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Backup name
        #[arg(short, long)]
        name: Option<String>,

        /// Skip hidden files and directories
        #[arg(long)]
        omit_hidden: bool,

        /// Follow symbolic links
        #[arg(long)]
        follow_symlinks: bool,
    },

    /// Verify every stored blob
    Check,

    /// Restore a backup
    #[command(alias = "rs")]
    Restore {
        /// Date of the backup (prefix of YYYY-MM-DD_hh-mm-ss)
        #[arg(short, long)]
        date: String,

        /// Backup name
        #[arg(short, long)]
        name: Option<String>,

        /// Directory to restore into
        destination: PathBuf,
    },

    /// List snapshots
    #[command(alias = "ls")]
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "off"
    } else {
        match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Main command runner; returns the process exit code
fn run(cli: Cli) -> Result<i32> {
    let mut builder = RepositoryBuilder::new()
        .omit_errors(cli.omit_errors)
        .buffer_size(cli.buffer_size);
    if let Some(threads) = cli.threads {
        builder = builder.threads(threads);
    }
    let quiet = cli.quiet;

    match cli.command {
        Commands::Init { sum } => cmd_init(builder, cli.repo, &sum),
        Commands::Backup {
            paths,
            name,
            omit_hidden,
            follow_symlinks,
        } => {
            let options = BackupOptions {
                paths,
                name,
                omit_hidden,
                follow_symlinks,
            };
            cmd_backup(builder.open(cli.repo)?, options, quiet)
        }
        Commands::Check => cmd_check(builder.open(cli.repo)?, quiet),
        Commands::Restore {
            date,
            name,
            destination,
        } => cmd_restore(builder.open(cli.repo)?, name, date, destination, quiet),
        Commands::List { json } => cmd_list(builder.open(cli.repo)?, json),
    }
}

fn spinner(quiet: bool, message: &'static str) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Create a repository
///
/// Lays out `backups/`, the 256 `files/` buckets and `settings.toml`.
fn cmd_init(builder: RepositoryBuilder, path: PathBuf, sum: &str) -> Result<i32> {
    let algorithm: HashAlgorithm = sum.parse()?;
    let repo = builder.create(path, algorithm)?;

    println!("{} Initialized Cairn repository", "✓".green().bold());
    println!("  Path: {}", repo.path().display().to_string().cyan());
    println!("  Hash algorithm: {}", algorithm.as_str().cyan());
    println!("\nNext steps:");
    println!(
        "  - Back up a directory: {}",
        format!("cairn -r {} backup <path>", repo.path().display()).yellow()
    );
    Ok(0)
}

fn cmd_backup(repo: Repository, options: BackupOptions, quiet: bool) -> Result<i32> {
    let progress = spinner(quiet, "Backing up files...");
    let summary = repo.backup(&options);
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let summary = summary?;

    println!("{} Backup complete", "✓".green().bold());
    println!("  Manifest: {}", summary.manifest_path.display().to_string().cyan());
    println!("  Files: {}", summary.files_found.to_string().cyan());
    println!(
        "  New content: {} blobs, {}",
        summary.blobs_added.to_string().cyan(),
        format_bytes(summary.bytes_added).cyan()
    );
    println!("  Already stored: {} blobs", summary.blobs_existing.to_string().cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(summary.duration_ms)).to_string().cyan()
    );

    if !summary.skipped.is_empty() {
        println!("\n{}", "Skipped:".yellow().bold());
        for item in &summary.skipped {
            println!("  - {}", item.yellow());
        }
    }
    Ok(0)
}

/// Verify every blob
///
/// Exits with status 1 when any blob is damaged.
fn cmd_check(repo: Repository, quiet: bool) -> Result<i32> {
    let progress = spinner(quiet, "Checking blobs...");
    let report = repo.check();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let report = report?;

    if report.is_valid() {
        println!("{} {}", "✓".green().bold(), report.summary());
        return Ok(0);
    }

    println!("{} {}", "✗".red().bold(), report.summary());
    for issue in &report.issues {
        let label = match issue.kind {
            IssueKind::MalformedName => "name".red(),
            IssueKind::SizeMismatch => "size".red(),
            IssueKind::HashMismatch => "hash".red(),
            IssueKind::Unreadable => "read".yellow(),
        };
        println!("  [{}] {}", label, issue.message);
    }
    Ok(1)
}

fn cmd_restore(
    repo: Repository,
    name: Option<String>,
    date: String,
    destination: PathBuf,
    quiet: bool,
) -> Result<i32> {
    let progress = spinner(quiet, "Restoring files...");
    let result = repo.restore(name.as_deref(), &date, &destination);
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let result = result?;

    println!("{} Restoration complete", "✓".green().bold());
    println!("  From: {}", result.manifest_path.display().to_string().cyan());
    println!("  Files restored: {}", result.files_restored.to_string().cyan());
    println!("  Directories created: {}", result.dirs_created.to_string().cyan());
    println!("  Bytes written: {}", format_bytes(result.bytes_written).cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(result.duration_ms)).to_string().cyan()
    );

    if !result.warnings.is_empty() {
        println!("\n{}", "Warnings:".yellow().bold());
        for warning in &result.warnings {
            println!("  - {}", warning.yellow());
        }
    }
    Ok(0)
}

fn cmd_list(repo: Repository, json: bool) -> Result<i32> {
    let groups = repo.list()?;
    if json {
        println!("{}", list_json(&groups));
        return Ok(0);
    }

    for group in &groups {
        match &group.name {
            Some(name) => println!("{}", name.bold()),
            None => println!("{}", "[no-name]".dimmed()),
        }
        for time in &group.snapshots {
            println!("- {}", time.format("%Y/%m/%d %H:%M:%S"));
        }
        println!();
    }
    Ok(0)
}

/// `{"snapshots":[{"name":"","times":[<unix seconds>...]}]}`
fn list_json(groups: &[BackupGroup]) -> serde_json::Value {
    let snapshots: Vec<_> = groups
        .iter()
        .map(|g| {
            serde_json::json!({
                "name": g.name.clone().unwrap_or_default(),
                "times": g.snapshots.iter().map(|t| t.and_utc().timestamp()).collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::json!({ "snapshots": snapshots })
}

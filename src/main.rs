// src/main.rs
//
// pageorder - order page images by pairwise judgment and rename them

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pageorder::application::{open_cache, AppState, ErrorResponse};
use pageorder::config::AppConfig;
use pageorder::domain::Verdict;
use pageorder::error::{AppError, AppResult};
use pageorder::events::ComparisonProgressed;
use pageorder::infrastructure::{BackupSnapshot, StdFileSystem};
use pageorder::integrations::HintOracle;
use pageorder::services::{RunOptions, RunReport};

#[derive(Parser)]
#[command(name = "pageorder")]
#[command(about = "Order page images from pairwise judgments and rename them atomically", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON to stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Order the images in a folder and rename them
    Order {
        /// Folder holding the images
        directory: PathBuf,

        /// Target name prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Zero-padded index width
        #[arg(long)]
        digits: Option<usize>,

        /// Index of the first page
        #[arg(long)]
        start: Option<u64>,

        /// Concurrent oracle calls
        #[arg(short, long)]
        workers: Option<usize>,

        /// Include images in subfolders; their renamed files are gathered in
        /// the target directory
        #[arg(short, long)]
        recursive: bool,

        /// Directory the renamed files land in (defaults to the folder
        /// holding the images)
        #[arg(long)]
        target_dir: Option<PathBuf>,

        /// Skip images smaller than this many bytes
        #[arg(long)]
        min_size: Option<u64>,

        /// Skip images larger than this many bytes
        #[arg(long)]
        max_size: Option<u64>,

        /// Show the plan without renaming anything
        #[arg(long)]
        dry_run: bool,

        /// Do not read or write the comparison cache
        #[arg(long)]
        no_cache: bool,

        /// Refuse to rename when judgments contradict the order
        #[arg(long)]
        strict: bool,
    },

    /// List the images a folder would contribute, with size and hint
    Scan {
        directory: PathBuf,

        /// Include images in subfolders
        #[arg(short, long)]
        recursive: bool,
    },

    /// Put files back from a backup snapshot
    Restore {
        /// Snapshot directory, or a snapshot id under the backup root
        snapshot: PathBuf,
    },

    /// List backup snapshots, newest first
    Snapshots,

    /// Inspect or clear the comparison cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove cached judgments
    Clear {
        /// Only remove FAILED judgments
        #[arg(long)]
        failed_only: bool,
    },

    /// Show cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli).await {
        let response = ErrorResponse::from_app_error(e);
        if json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else {
            if let Some(report) = &response.report {
                print_report(report);
            }
            eprintln!("error: {}", response.message);
            if let Some(details) = &response.details {
                eprintln!("  {}", details);
            }
            for path in &response.unrestored {
                eprintln!("  not restored: {}", path.display());
            }
        }
        std::process::exit(response.exit_code());
    }

    Ok(())
}

/// Logs to stderr; `RUST_LOG` overrides the default filter
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pageorder=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> AppResult<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Order {
            directory,
            prefix,
            digits,
            start,
            workers,
            recursive,
            target_dir,
            min_size,
            max_size,
            dry_run,
            no_cache,
            strict,
        } => {
            if let Some(prefix) = prefix {
                config.naming.prefix = prefix;
            }
            if let Some(digits) = digits {
                config.naming.digits = digits;
            }
            if let Some(start) = start {
                config.naming.start_index = start;
            }
            if let Some(workers) = workers {
                config.orchestrator.workers = workers;
            }
            if recursive {
                config.scan.recursive = true;
            }
            if min_size.is_some() {
                config.scan.min_size = min_size;
            }
            if max_size.is_some() {
                config.scan.max_size = max_size;
            }
            if no_cache {
                config.cache.enabled = false;
            }
            config.validate()?;

            // A recursive scan gathers everything into the scanned folder
            let target_dir = match target_dir {
                Some(target) => Some(target),
                None if config.scan.recursive => Some(directory.clone()),
                None => None,
            };

            order(config, &directory, target_dir, dry_run, strict, cli.json).await
        }
        Commands::Scan {
            directory,
            recursive,
        } => {
            if recursive {
                config.scan.recursive = true;
            }
            config.validate()?;
            scan(&config, &directory, cli.json)
        }
        Commands::Restore { snapshot } => restore(&config, &snapshot, cli.json),
        Commands::Snapshots => snapshots(&config, cli.json),
        Commands::Cache { action } => cache(&config, action, cli.json),
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

async fn order(
    config: AppConfig,
    directory: &Path,
    target_directory: Option<PathBuf>,
    dry_run: bool,
    strict: bool,
    json: bool,
) -> AppResult<()> {
    let state = AppState::build(config, Arc::new(HintOracle::new()))?;
    let items = state.scanner.scan_folder(directory)?;

    if !json {
        state
            .event_bus
            .subscribe::<ComparisonProgressed, _>(|event| {
                eprint!("\rcompared {}/{} pairs", event.resolved, event.total);
                if event.resolved == event.total {
                    eprintln!();
                }
            });
    }

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; stopping after the current step");
            token.cancel();
        }
    });

    let options = RunOptions {
        naming: state.config.naming.clone(),
        dry_run,
        strict,
        target_directory,
    };
    let report = state.pipeline.run(&items, &options, &cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let targets: std::collections::HashMap<&Path, &Path> = report
        .plan
        .iter()
        .map(|e| (e.source.as_path(), e.target.as_path()))
        .collect();

    for placed in &report.items {
        let target = targets
            .get(placed.item.path.as_path())
            .and_then(|t| t.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "{:>4}  {} -> {}  (score {:+.2}, confidence {:.2}){}",
            placed.position + 1,
            placed.item.file_name(),
            target,
            placed.net_score,
            placed.confidence,
            if placed.conflict { "  CONFLICT" } else { "" }
        );
    }

    println!();
    println!(
        "oracle calls: {} made, {} cached, {} retried, {} failed, {} uncertain",
        report.oracle_calls.made,
        report.oracle_calls.cached,
        report.oracle_calls.retried,
        report.oracle_calls.failed,
        report.oracle_calls.uncertain
    );
    if !report.conflicts.is_empty() {
        println!("{} judgments contradict the final order", report.conflicts.len());
    }
    for pair in &report.unresolved {
        let label = match pair.verdict {
            Verdict::Failed => "failed",
            _ => "uncertain",
        };
        println!(
            "unresolved ({}): {} / {}",
            label,
            pair.first.display(),
            pair.second.display()
        );
    }
    if !report.sequence.is_valid {
        println!(
            "numbering: missing {:?}, duplicated {:?}",
            report.sequence.missing,
            report.sequence.duplicates.keys().collect::<Vec<_>>()
        );
    }
    if let Some(state) = report.state {
        println!("transaction: {}", state);
    }
    if let Some(snapshot) = &report.snapshot_path {
        println!("backup: {}", snapshot.display());
    }
    if report.dry_run {
        println!("dry run: nothing was renamed");
    }
}

fn scan(config: &AppConfig, directory: &Path, json: bool) -> AppResult<()> {
    let files = config.scan_service()?.scan_info(directory)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    for file in &files {
        println!(
            "{:>10}  {}  {}",
            file.size,
            file.hint.map(|h| h.to_string()).unwrap_or_else(|| "-".to_string()),
            file.path.display()
        );
    }
    println!(
        "{} images, {} bytes",
        files.len(),
        files.iter().map(|f| f.size).sum::<u64>()
    );
    Ok(())
}

fn restore(config: &AppConfig, snapshot: &Path, json: bool) -> AppResult<()> {
    let directory = if snapshot.is_dir() {
        snapshot.to_path_buf()
    } else {
        config.backup_root()?.join(snapshot)
    };

    let snapshot = BackupSnapshot::load(&StdFileSystem, &directory)?;
    let report = snapshot.restore(&StdFileSystem)?;

    // Cached judgments may have followed the renames; drop them
    if config.cache.enabled {
        let touched: Vec<PathBuf> = snapshot
            .manifest
            .files
            .iter()
            .flat_map(|f| std::iter::once(f.original_path.clone()).chain(f.planned_target.clone()))
            .collect();
        let forgotten = open_cache(config)?.forget(&touched)?;
        log::debug!("Dropped {} cached judgments for restored files", forgotten);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "restored {} files, {} already intact, {} renamed copies removed",
            report.restored.len(),
            report.already_intact.len(),
            report.removed_targets.len()
        );
    }
    Ok(())
}

fn snapshots(config: &AppConfig, json: bool) -> AppResult<()> {
    let root = config.backup_root()?;
    let snapshots = BackupSnapshot::list(&StdFileSystem, &root)?;

    if json {
        let manifests: Vec<_> = snapshots.iter().map(|s| &s.manifest).collect();
        println!("{}", serde_json::to_string_pretty(&manifests)?);
        return Ok(());
    }

    if snapshots.is_empty() {
        println!("no snapshots under {}", root.display());
    }
    for snapshot in &snapshots {
        println!(
            "{}  {} files  from {}",
            snapshot.id(),
            snapshot.manifest.files.len(),
            snapshot.manifest.source_directory.display()
        );
    }
    Ok(())
}

fn cache(config: &AppConfig, action: CacheAction, json: bool) -> AppResult<()> {
    if !config.cache.enabled {
        return Err(AppError::InvalidConfiguration(
            "the comparison cache is disabled".to_string(),
        ));
    }
    let cache = open_cache(config)?;

    match action {
        CacheAction::Clear { failed_only } => {
            let removed = if failed_only {
                cache.remove_failed()?
            } else {
                cache.clear()?
            };
            if json {
                println!("{}", serde_json::json!({ "removed": removed }));
            } else {
                println!("removed {} cached judgments", removed);
            }
        }
        CacheAction::Stats => {
            let judgments = cache.list_all()?;
            let count = |verdict: Verdict| judgments.iter().filter(|j| j.verdict == verdict).count();
            let stats = serde_json::json!({
                "database": config.cache_database_path()?,
                "total": judgments.len(),
                "a_before_b": count(Verdict::ABeforeB),
                "b_before_a": count(Verdict::BBeforeA),
                "uncertain": count(Verdict::Uncertain),
                "failed": count(Verdict::Failed),
            });
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "{} cached judgments ({} uncertain, {} failed) in {}",
                    judgments.len(),
                    count(Verdict::Uncertain),
                    count(Verdict::Failed),
                    config.cache_database_path()?.display()
                );
            }
        }
    }
    Ok(())
}

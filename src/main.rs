//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest page harvester.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::{
    run, ConcurrentRunner, Doer, ErrorHandler, HttpDoer, Request, Runner, SequentialRunner,
    TitleTask, PAGE_TITLE_SCHEMA,
};
use sumi_harvest::storage::{open_database, PrinterTx, Tx};
use sumi_harvest::task::AnyTask;
use sumi_harvest::HarvestError;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: transactional page harvesting
///
/// Sumi-Harvest fetches every configured target page, records its title and
/// outgoing link count, and commits all of them as one transaction: either
/// every page is stored or none is.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Transactional page harvesting", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else {
        handle_harvest(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Runner Configuration:");
    println!("  Workers: {}", config.runner.workers);
    println!("  Fetch attempts: {}", config.runner.retry_count);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    match &config.output.database_path {
        Some(path) => println!("  Database: {}", path),
        None => println!("  Database: none, records are printed"),
    }

    println!("\nTargets ({}):", config.target.len());
    for target in &config.target {
        println!("  - {}", target.url);
    }

    println!("\n✓ Configuration is valid");
}

/// Logs each failed target and counts it
#[derive(Default)]
struct FailureCount(AtomicUsize);

impl ErrorHandler for FailureCount {
    fn handle_error(&self, request: &Request, error: HarvestError) -> Result<(), HarvestError> {
        tracing::error!("Failed to harvest {}: {}", request.url, error);
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let tasks = config
        .target
        .iter()
        .map(|target| TitleTask::new(&target.url).map(AnyTask::dom))
        .collect::<Result<Vec<_>, _>>()?;
    let task_count = tasks.len();

    let tx: Arc<dyn Tx> = match &config.output.database_path {
        Some(path) => {
            let db = open_database(Path::new(path))?;
            db.execute_batch(PAGE_TITLE_SCHEMA)?;
            Arc::new(db.begin())
        }
        None => Arc::new(PrinterTx),
    };

    let doer: Arc<dyn Doer> = Arc::new(HttpDoer::from_config(&config.user_agent)?);
    let failures = Arc::new(FailureCount::default());
    let runner: Box<dyn Runner> = if config.runner.workers == 1 {
        Box::new(SequentialRunner::new(doer, failures.clone(), &config.runner))
    } else {
        Box::new(ConcurrentRunner::new(doer, failures.clone(), &config.runner))
    };

    tracing::info!(
        "Harvesting {} targets with {} workers",
        task_count,
        config.runner.workers
    );

    let result = run(runner.as_ref(), tx, tasks).await;
    runner.close().await;
    result?;

    let failed = failures.0.load(Ordering::SeqCst);
    if failed > 0 {
        tracing::error!("{} of {} targets failed, nothing was committed", failed, task_count);
        return Err(format!("{} of {} targets failed", failed, task_count).into());
    }

    tracing::info!("Harvest of {} targets committed", task_count);
    Ok(())
}

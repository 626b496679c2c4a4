use anyhow::Result;
use clap::{Parser, Subcommand};
use quote_analyzer::batch::{Source, load_config, resolve_snapshot, run_configured_batch};
use quote_analyzer::freshness::SystemClock;
use quote_analyzer::report;
use quote_analyzer::runner::AnalysisRunner;
use quote_analyzer::sink::{JsonTableSink, MemorySink, MetricRecord};
use quote_analyzer::storage_utils::AsyncStorageManager;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "quote-analyzer")]
#[command(about = "Computes price metrics from hourly quote snapshots", long_about = None)]
struct Cli {
    /// Directory holding config.json and the results table (default: ./storage next to the binary)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one snapshot folder
    Run {
        /// Snapshot date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Snapshot hour folder (default: latest available)
        #[arg(long)]
        hour: Option<u32>,
        /// Print the records instead of saving them
        #[arg(long)]
        dry_run: bool,
    },
    /// Analyze today's latest snapshot on every schedule tick
    Watch {
        /// Fixed hour folder, required for http sources
        #[arg(long)]
        hour: Option<u32>,
    },
    /// Show the saved metrics
    Report {
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

async fn open_storage(path: Option<PathBuf>) -> Result<AsyncStorageManager> {
    Ok(match path {
        Some(path) => AsyncStorageManager::new(path).await?,
        None => AsyncStorageManager::new_relative("storage").await?,
    })
}

async fn run_once(
    storage: &AsyncStorageManager,
    date: Option<String>,
    hour: Option<u32>,
    dry_run: bool,
) -> Result<()> {
    let clock = SystemClock;

    if !dry_run {
        run_configured_batch(storage, &clock, date, hour).await?;
        return Ok(());
    }

    let config = load_config(storage).await?;
    let source = Source::from_config(&config.source)?;
    let Some(key) = resolve_snapshot(&source, &clock, date, hour).await? else {
        return Ok(());
    };

    let sink = MemorySink::new();
    AnalysisRunner::new(source.fetcher(), &sink, &clock, config.symbols)
        .run_batch(&key)
        .await;
    print_records(&sink.records(), None);

    Ok(())
}

/// Runs a batch on every tick. Config is re-read each time, so edits to the
/// symbol list, source or table take effect without a restart.
async fn watch(storage: &AsyncStorageManager, interval_secs: u64, hour: Option<u32>) {
    let clock = SystemClock;

    info!(interval_secs, "Starting analyzer schedule");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        ticker.tick().await;
        if let Err(e) = run_configured_batch(storage, &clock, None, hour).await {
            error!(error = %e, "Failed to run analyzer for this batch, will try again next tick");
        }
    }
}

fn print_records(records: &[MetricRecord], symbol: Option<&str>) {
    match report::render(records, symbol) {
        Some(table) => println!("\n{}", table),
        None => println!("No metrics found."),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let storage = open_storage(cli.storage).await?;

    match cli.command {
        Commands::Run {
            date,
            hour,
            dry_run,
        } => run_once(&storage, date, hour, dry_run).await,
        Commands::Watch { hour } => {
            // The interval is fixed at startup; everything else reloads per tick.
            let config = load_config(&storage).await?;
            watch(&storage, config.schedule.interval_secs, hour).await;
            Ok(())
        }
        Commands::Report { symbol } => {
            let config = load_config(&storage).await?;
            let sink = JsonTableSink::new(storage, config.results.table);
            print_records(&sink.records().await?, symbol.as_deref());
            Ok(())
        }
    }
}

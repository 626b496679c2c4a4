//! One scheduled batch: reload config, pick the snapshot folder, run the analyzer.

use crate::error::{AnalyzerError, Result};
use crate::fetcher::{
    DirSeriesFetcher, HttpSeriesFetcher, SeriesFetcher, SnapshotKey, SnapshotLocator,
};
use crate::freshness::Clock;
use crate::runner::{AnalysisRunner, BatchSummary};
use crate::sink::JsonTableSink;
use crate::storage_utils::{AppConfig, AsyncStorageManager, SourceConfig};
use chrono::NaiveDate;
use tracing::warn;

pub enum Source {
    Dir(DirSeriesFetcher),
    Http(HttpSeriesFetcher),
}

impl Source {
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Ok(match config {
            SourceConfig::Dir { path } => Source::Dir(DirSeriesFetcher::new(path)?),
            SourceConfig::Http { base_url } => Source::Http(HttpSeriesFetcher::new(base_url)?),
        })
    }

    pub fn fetcher(&self) -> &dyn SeriesFetcher {
        match self {
            Source::Dir(f) => f,
            Source::Http(f) => f,
        }
    }

    pub fn locator(&self) -> Option<&dyn SnapshotLocator> {
        match self {
            Source::Dir(f) => Some(f),
            Source::Http(_) => None,
        }
    }
}

/// Reads and checks `config.json` from the storage directory.
pub async fn load_config(storage: &AsyncStorageManager) -> Result<AppConfig> {
    let config: AppConfig = storage.load("config").await.map_err(|e| {
        AnalyzerError::Config(format!(
            "loading config.json from {}: {}",
            storage.base_dir.display(),
            e
        ))
    })?;
    config.validate()?;
    Ok(config)
}

/// Picks the snapshot folder for a batch. `None` when there is nothing to analyze.
pub async fn resolve_snapshot(
    source: &Source,
    clock: &dyn Clock,
    date: Option<String>,
    hour: Option<u32>,
) -> Result<Option<SnapshotKey>> {
    let date = date.unwrap_or_else(|| SnapshotKey::date_of(clock.now()));
    NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| AnalyzerError::Config(format!("invalid snapshot date {:?}: {}", date, e)))?;

    let hour = match (hour, source.locator()) {
        (Some(hour), _) => Some(hour),
        (None, Some(locator)) => locator.latest_hour(&date).await?,
        (None, None) => {
            return Err(AnalyzerError::Config(
                "--hour is required when reading snapshots over http".to_string(),
            ));
        }
    };

    match hour {
        Some(hour) => Ok(Some(SnapshotKey::new(date, hour))),
        None => {
            warn!(date = %date, "Did not find any snapshot folder for date");
            Ok(None)
        }
    }
}

/// Runs one batch against the config currently on disk, so symbol list,
/// source and table edits apply from the next batch on.
pub async fn run_configured_batch(
    storage: &AsyncStorageManager,
    clock: &dyn Clock,
    date: Option<String>,
    hour: Option<u32>,
) -> Result<Option<BatchSummary>> {
    // 1. Fresh config for every batch
    let config = load_config(storage).await?;

    // 2. Snapshot folder for this batch
    let source = Source::from_config(&config.source)?;
    let Some(key) = resolve_snapshot(&source, clock, date, hour).await? else {
        return Ok(None);
    };

    // 3. Analyze and upsert into the configured table
    let sink = JsonTableSink::new(storage.clone(), config.results.table);
    let summary = AnalysisRunner::new(source.fetcher(), &sink, clock, config.symbols)
        .run_batch(&key)
        .await;

    Ok(Some(summary))
}

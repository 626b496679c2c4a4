//! Snapshot retrieval.
//!
//! Snapshots live under `{date}/{hour}/{symbol}/stock.json` in a bucket, either
//! mirrored to a local directory or served over HTTP.

use crate::error::{AnalyzerError, Result};
use crate::quote_series::QuoteSeries;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// The `date/hour` folder a batch reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotKey {
    pub date: String, // yyyy-MM-dd
    pub hour: u32,
}

impl SnapshotKey {
    pub fn new(date: impl Into<String>, hour: u32) -> Self {
        Self {
            date: date.into(),
            hour,
        }
    }

    pub fn date_of(now: NaiveDateTime) -> String {
        now.format("%Y-%m-%d").to_string()
    }

    pub fn object_key(&self, symbol: &str) -> String {
        format!("{}/{}/{}/stock.json", self.date, self.hour, symbol)
    }
}

#[async_trait]
pub trait SeriesFetcher: Send + Sync {
    /// `Ok(None)` when no snapshot exists for the symbol or the provider
    /// returned no series.
    async fn fetch(&self, symbol: &str, key: &SnapshotKey) -> Result<Option<QuoteSeries>>;
}

#[async_trait]
pub trait SnapshotLocator: Send + Sync {
    /// Largest hour folder under `date`, if any.
    async fn latest_hour(&self, date: &str) -> Result<Option<u32>>;
}

pub struct DirSeriesFetcher {
    root: PathBuf,
    hour_pattern: Regex,
}

impl DirSeriesFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let hour_pattern = Regex::new(r"^\d{1,2}$")
            .map_err(|e| AnalyzerError::Config(format!("hour pattern: {}", e)))?;
        Ok(Self {
            root: root.into(),
            hour_pattern,
        })
    }
}

#[async_trait]
impl SeriesFetcher for DirSeriesFetcher {
    async fn fetch(&self, symbol: &str, key: &SnapshotKey) -> Result<Option<QuoteSeries>> {
        let path = self.root.join(key.object_key(symbol));

        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AnalyzerError::Fetch(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        QuoteSeries::from_snapshot(symbol, &content)
    }
}

#[async_trait]
impl SnapshotLocator for DirSeriesFetcher {
    async fn latest_hour(&self, date: &str) -> Result<Option<u32>> {
        let date_dir = self.root.join(date);

        let mut entries = match fs::read_dir(&date_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<u32> = None;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !self.hour_pattern.is_match(name) {
                continue;
            }
            if let Ok(hour) = name.parse::<u32>() {
                latest = Some(latest.map_or(hour, |h| h.max(hour)));
            }
        }

        Ok(latest)
    }
}

pub struct HttpSeriesFetcher {
    client: Client,
    base_url: String,
}

impl HttpSeriesFetcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn object_url(&self, symbol: &str, key: &SnapshotKey) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            key.object_key(symbol)
        )
    }
}

#[async_trait]
impl SeriesFetcher for HttpSeriesFetcher {
    async fn fetch(&self, symbol: &str, key: &SnapshotKey) -> Result<Option<QuoteSeries>> {
        let url = self.object_url(symbol, key);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(symbol, %status, "Snapshot store refused request, treating as no data");
            return Ok(None);
        }

        if !status.is_success() {
            return Err(AnalyzerError::Fetch(format!("{} returned {}", url, status)));
        }

        let body = response.bytes().await?;
        QuoteSeries::from_snapshot(symbol, &body)
    }
}

use crate::error::{AnalyzerError, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

// CONFIGURATION STRUCTS

/// Where the per-symbol snapshots are read from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Local mirror of the snapshot bucket: `{path}/{date}/{hour}/{symbol}/stock.json`
    Dir { path: PathBuf },
    /// Object store reachable over HTTP with the same key layout.
    Http { base_url: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultsConfig {
    pub table: String, // e.g., "Analytics-testing"
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_secs: 3600 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub symbols: Vec<String>,
    pub source: SourceConfig,
    pub results: ResultsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(AnalyzerError::Config("no symbols configured".to_string()));
        }
        if self.results.table.trim().is_empty() {
            return Err(AnalyzerError::Config("results table name is empty".to_string()));
        }
        if self.schedule.interval_secs == 0 {
            return Err(AnalyzerError::Config("schedule interval must be positive".to_string()));
        }
        Ok(())
    }
}

// STORAGE MANAGER

#[derive(Debug, Clone)]
pub struct AsyncStorageManager {
    // Absolute path of the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Storage directory next to the running executable.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> Result<Self> {
        // 1. Locate the running executable
        let exe_path = std::env::current_exe()?;

        // 2. Resolve its parent directory and append the relative path (e.g., "storage")
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| AnalyzerError::Io("Could not find binary directory".to_string()))?
            .join(relative_path);

        Self::new(base_dir).await
    }

    /// Creates the directory up front so saves never have to check for it.
    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Serializes `data` to `{filename}.json`.
    ///
    /// Writes a `.tmp` sibling first and renames it over the target, so a crash
    /// mid-write leaves the previous file intact.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        let file_name = format!("{}.json", filename);
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));

        // Serialize to pretty JSON
        let json_bytes = serde_json::to_vec_pretty(data)?;

        // 1. Write data to the temporary file
        fs::write(&tmp_path, json_bytes).await?;

        // 2. Atomically rename the temp file over the final name
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));

        // serde_json validates while parsing, so skip the UTF-8 pass of read_to_string.
        let content = fs::read(path).await?;

        // Parse the raw bytes into the requested type
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Like [`load`](Self::load), but a missing file is `Ok(None)`.
    pub async fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.base_dir.join(format!("{}.json", filename));

        match fs::read(path).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

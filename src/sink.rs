//! Metric record persistence, upserted by `(symbol, metric_type)`.

use crate::error::{AnalyzerError, Result};
use crate::freshness::FreshnessStatus;
use crate::metrics::MetricType;
use crate::storage_utils::AsyncStorageManager;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricRecord {
    #[serde(rename = "symb")]
    pub symbol: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub value: String,
    pub freshness: FreshnessStatus,
}

impl MetricRecord {
    pub fn key(&self) -> (String, MetricType) {
        (self.symbol.clone(), self.metric_type)
    }
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Replaces any record with the same `(symbol, metric_type)`.
    async fn upsert(&self, record: &MetricRecord) -> Result<()>;
}

/// Results table stored as `{table}.json` in the storage directory.
pub struct JsonTableSink {
    storage: AsyncStorageManager,
    table: String,
}

impl JsonTableSink {
    pub fn new(storage: AsyncStorageManager, table: impl Into<String>) -> Self {
        Self {
            storage,
            table: table.into(),
        }
    }

    /// All records, ordered by symbol then metric type.
    pub async fn records(&self) -> Result<Vec<MetricRecord>> {
        Ok(self
            .storage
            .load_optional(&self.table)
            .await
            .map_err(|e| AnalyzerError::Sink(format!("read table {}: {}", self.table, e)))?
            .unwrap_or_default())
    }
}

#[async_trait]
impl ResultSink for JsonTableSink {
    async fn upsert(&self, record: &MetricRecord) -> Result<()> {
        let mut table: BTreeMap<(String, MetricType), MetricRecord> = self
            .records()
            .await?
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();

        table.insert(record.key(), record.clone());

        let rows: Vec<&MetricRecord> = table.values().collect();
        self.storage
            .save(&self.table, &rows)
            .await
            .map_err(|e| AnalyzerError::Sink(format!("write table {}: {}", self.table, e)))
    }
}

/// In-process table, used for dry runs.
#[derive(Default)]
pub struct MemorySink {
    table: Mutex<BTreeMap<(String, MetricType), MetricRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MetricRecord> {
        match self.table.lock() {
            Ok(table) => table.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn upsert(&self, record: &MetricRecord) -> Result<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| AnalyzerError::Sink("memory table lock poisoned".to_string()))?;
        table.insert(record.key(), record.clone());
        Ok(())
    }
}

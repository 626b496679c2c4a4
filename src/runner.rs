//! Batch orchestration: fetch, validate, classify, compute, emit, per symbol.

use crate::error::{AnalyzerError, Result};
use crate::fetcher::{SeriesFetcher, SnapshotKey};
use crate::freshness::{self, Clock};
use crate::metrics::{self, MetricType};
use crate::quote_series::QuoteSeries;
use crate::sink::{MetricRecord, ResultSink};
use crate::validator;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub analyzed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub records_written: usize,
    pub write_failures: usize,
}

pub struct AnalysisRunner<'a> {
    fetcher: &'a dyn SeriesFetcher,
    sink: &'a dyn ResultSink,
    clock: &'a dyn Clock,
    symbols: Vec<String>,
}

impl<'a> AnalysisRunner<'a> {
    pub fn new(
        fetcher: &'a dyn SeriesFetcher,
        sink: &'a dyn ResultSink,
        clock: &'a dyn Clock,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            fetcher,
            sink,
            clock,
            symbols,
        }
    }

    /// Processes every configured symbol in order. A failing symbol is logged
    /// and counted; it never stops the batch.
    #[instrument(skip(self), fields(date = %key.date, hour = key.hour))]
    pub async fn run_batch(&self, key: &SnapshotKey) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for symbol in &self.symbols {
            info!(symbol = %symbol, "Running stock analyzer");

            let series = match self.fetcher.fetch(symbol, key).await {
                Ok(series) => series,
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "Failed to fetch snapshot, skipping symbol");
                    summary.failed += 1;
                    continue;
                }
            };

            let series = match usable_series(series, key, symbol) {
                Ok(series) => series,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Skipping symbol");
                    summary.skipped += 1;
                    continue;
                }
            };

            let freshness = freshness::classify(&series, self.clock.now());

            let Some(metrics) = metrics::compute(&series) else {
                warn!(symbol = %symbol, "Every high price is NaN, skipping symbol");
                summary.skipped += 1;
                continue;
            };

            for metric_type in MetricType::ALL {
                let record = MetricRecord {
                    symbol: symbol.clone(),
                    metric_type,
                    value: metrics.value_of(metric_type),
                    freshness,
                };

                match self.sink.upsert(&record).await {
                    Ok(()) => {
                        info!(
                            symbol = %symbol,
                            metric = %metric_type,
                            value = %record.value,
                            freshness = %freshness,
                            "Saved metric"
                        );
                        summary.records_written += 1;
                    }
                    Err(e) => {
                        error!(symbol = %symbol, metric = %metric_type, error = %e, "Failed to save metric");
                        summary.write_failures += 1;
                    }
                }
            }

            summary.analyzed += 1;
        }

        info!(
            analyzed = summary.analyzed,
            skipped = summary.skipped,
            failed = summary.failed,
            records_written = summary.records_written,
            write_failures = summary.write_failures,
            "Batch finished"
        );

        summary
    }
}

/// Passes a fetched series through the validator.
fn usable_series(
    series: Option<QuoteSeries>,
    key: &SnapshotKey,
    symbol: &str,
) -> Result<QuoteSeries> {
    match series {
        Some(series) if validator::validate(Some(&series)) => Ok(series),
        _ => Err(AnalyzerError::MissingData(format!(
            "no usable quotes in {}",
            key.object_key(symbol)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::{FixedClock, FreshnessStatus};
    use crate::quote_series::Quote;
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use std::collections::HashMap;

    enum Canned {
        Series(QuoteSeries),
        Missing,
        Broken,
    }

    struct CannedFetcher(HashMap<String, Canned>);

    #[async_trait]
    impl SeriesFetcher for CannedFetcher {
        async fn fetch(&self, symbol: &str, _key: &SnapshotKey) -> Result<Option<QuoteSeries>> {
            match self.0.get(symbol) {
                Some(Canned::Series(series)) => Ok(Some(series.clone())),
                Some(Canned::Broken) => Err(AnalyzerError::Fetch("connection reset".to_string())),
                Some(Canned::Missing) | None => Ok(None),
            }
        }
    }

    /// Rejects writes for one metric type.
    struct FlakySink {
        inner: MemorySink,
        reject: MetricType,
    }

    #[async_trait]
    impl ResultSink for FlakySink {
        async fn upsert(&self, record: &MetricRecord) -> Result<()> {
            if record.metric_type == self.reject {
                return Err(AnalyzerError::Sink("throttled".to_string()));
            }
            self.inner.upsert(record).await
        }
    }

    fn clock() -> FixedClock {
        FixedClock(
            NaiveDateTime::parse_from_str("2024-01-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        )
    }

    fn example_series(symbol: &str) -> QuoteSeries {
        QuoteSeries::new(
            symbol,
            vec![
                ("2024-01-01 09:00:00".to_string(), Quote::new(10.0, 12.0, 9.0, 11.0, 100)),
                ("2024-01-01 10:00:00".to_string(), Quote::new(11.0, 15.0, 10.0, 14.0, 200)),
            ],
        )
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_usable_series_reports_missing_data() {
        let key = SnapshotKey::new("2024-01-01", 10);

        let absent = usable_series(None, &key, "GONE");
        assert!(matches!(absent, Err(AnalyzerError::MissingData(ref m)) if m.contains("2024-01-01/10/GONE/stock.json")));

        let empty = usable_series(Some(QuoteSeries::new("EMPTY", Vec::new())), &key, "EMPTY");
        assert!(matches!(empty, Err(AnalyzerError::MissingData(_))));

        let series = example_series("IBM");
        assert_eq!(usable_series(Some(series.clone()), &key, "IBM").unwrap(), series);
    }

    #[tokio::test]
    async fn test_all_nan_highs_are_skipped() {
        let series = QuoteSeries::new(
            "NAN",
            vec![("2024-01-01 09:00:00".to_string(), Quote::new(1.0, f64::NAN, 1.0, 1.0, 0))],
        );
        let fetcher = CannedFetcher(HashMap::from([("NAN".to_string(), Canned::Series(series))]));
        let sink = MemorySink::new();
        let clock = clock();
        let runner = AnalysisRunner::new(&fetcher, &sink, &clock, symbols(&["NAN"]));

        let summary = runner.run_batch(&SnapshotKey::new("2024-01-01", 10)).await;

        assert_eq!(summary.skipped, 1);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_example() {
        let fetcher = CannedFetcher(HashMap::from([(
            "IBM".to_string(),
            Canned::Series(example_series("IBM")),
        )]));
        let sink = MemorySink::new();
        let clock = clock();
        let runner = AnalysisRunner::new(&fetcher, &sink, &clock, symbols(&["IBM"]));

        let summary = runner.run_batch(&SnapshotKey::new("2024-01-01", 10)).await;

        assert_eq!(summary.analyzed, 1);
        assert_eq!(summary.records_written, 3);

        let values: Vec<(MetricType, String, FreshnessStatus)> = sink
            .records()
            .into_iter()
            .map(|r| (r.metric_type, r.value, r.freshness))
            .collect();
        assert_eq!(
            values,
            vec![
                (MetricType::MaxPrice, "15".to_string(), FreshnessStatus::Fresh),
                (
                    MetricType::BestProfitWindow,
                    "2,2024-01-01 09:00:00,2024-01-01 10:00:00".to_string(),
                    FreshnessStatus::Fresh
                ),
                (MetricType::PriceDiff, "4".to_string(), FreshnessStatus::Fresh),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_and_empty_series_emit_nothing() {
        let fetcher = CannedFetcher(HashMap::from([
            ("GONE".to_string(), Canned::Missing),
            ("EMPTY".to_string(), Canned::Series(QuoteSeries::new("EMPTY", Vec::new()))),
        ]));
        let sink = MemorySink::new();
        let clock = clock();
        let runner = AnalysisRunner::new(&fetcher, &sink, &clock, symbols(&["GONE", "EMPTY"]));

        let summary = runner.run_batch(&SnapshotKey::new("2024-01-01", 10)).await;

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.analyzed, 0);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_stop_batch() {
        let fetcher = CannedFetcher(HashMap::from([
            ("BAD".to_string(), Canned::Broken),
            ("IBM".to_string(), Canned::Series(example_series("IBM"))),
        ]));
        let sink = MemorySink::new();
        let clock = clock();
        let runner = AnalysisRunner::new(&fetcher, &sink, &clock, symbols(&["BAD", "IBM"]));

        let summary = runner.run_batch(&SnapshotKey::new("2024-01-01", 10)).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.analyzed, 1);
        assert!(sink.records().iter().all(|r| r.symbol == "IBM"));
        assert_eq!(sink.records().len(), 3);
    }

    #[tokio::test]
    async fn test_sink_failure_is_isolated_per_metric() {
        let fetcher = CannedFetcher(HashMap::from([
            ("IBM".to_string(), Canned::Series(example_series("IBM"))),
            ("MSFT".to_string(), Canned::Series(example_series("MSFT"))),
        ]));
        let sink = FlakySink {
            inner: MemorySink::new(),
            reject: MetricType::BestProfitWindow,
        };
        let clock = clock();
        let runner = AnalysisRunner::new(&fetcher, &sink, &clock, symbols(&["IBM", "MSFT"]));

        let summary = runner.run_batch(&SnapshotKey::new("2024-01-01", 10)).await;

        assert_eq!(summary.analyzed, 2);
        assert_eq!(summary.write_failures, 2);
        assert_eq!(summary.records_written, 4);
        assert_eq!(sink.inner.records().len(), 4);
    }

    #[tokio::test]
    async fn test_stale_series_is_tagged() {
        let stale = QuoteSeries::new(
            "OLD",
            vec![("2024-01-05 09:00:00".to_string(), Quote::new(1.0, 2.0, 1.0, 2.0, 0))],
        );
        let fetcher = CannedFetcher(HashMap::from([("OLD".to_string(), Canned::Series(stale))]));
        let sink = MemorySink::new();
        let clock = FixedClock(
            NaiveDateTime::parse_from_str("2024-01-09 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        );
        let runner = AnalysisRunner::new(&fetcher, &sink, &clock, symbols(&["OLD"]));

        runner.run_batch(&SnapshotKey::new("2024-01-09", 12)).await;

        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.freshness == FreshnessStatus::Stale));
    }
}

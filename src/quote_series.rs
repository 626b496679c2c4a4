//! Quote data model and snapshot decoding.
//!
//! A snapshot is one JSON blob per symbol. It is either a bare mapping from
//! `yyyy-MM-dd HH:mm:ss` to a quote object, or a vendor envelope carrying that
//! mapping under a `Time Series (...)` member.

use crate::error::{AnalyzerError, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp layout of series keys. Fixed width, so lexicographic order is chronological.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TIME_SERIES_PREFIX: &str = "Time Series";
const ENVELOPE_KEYS: &[&str] = &["Meta Data", "Note", "Information", "Error Message"];

/// One sampled interval. Values are passed through as supplied.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    #[serde(alias = "1. open", deserialize_with = "deserialize_f64_lenient")]
    pub open: f64,
    #[serde(alias = "2. high", deserialize_with = "deserialize_f64_lenient")]
    pub high: f64,
    #[serde(alias = "3. low", deserialize_with = "deserialize_f64_lenient")]
    pub low: f64,
    #[serde(alias = "4. close", deserialize_with = "deserialize_f64_lenient")]
    pub close: f64,
    #[serde(alias = "5. volume", deserialize_with = "deserialize_u64_lenient", default)]
    pub volume: u64,
}

impl Quote {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Mean of the four prices, used as the tradable price of the interval.
    pub fn average(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }
}

/// Quotes for one symbol, keyed and ordered by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSeries {
    symbol: String,
    quotes: BTreeMap<String, Quote>,
}

impl QuoteSeries {
    pub fn new<I>(symbol: impl Into<String>, quotes: I) -> Self
    where
        I: IntoIterator<Item = (String, Quote)>,
    {
        Self {
            symbol: symbol.into(),
            quotes: quotes.into_iter().collect(),
        }
    }

    /// Decodes a raw snapshot blob.
    ///
    /// Returns `Ok(None)` when the blob is a vendor envelope without any
    /// time series (quota notes, error messages).
    pub fn from_snapshot(symbol: &str, bytes: &[u8]) -> Result<Option<Self>> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut root) = value else {
            return Err(AnalyzerError::Parse(format!(
                "snapshot for {} is not a JSON object",
                symbol
            )));
        };

        let series_key = root
            .keys()
            .find(|k| k.starts_with(TIME_SERIES_PREFIX))
            .cloned();

        let mapping = match series_key {
            Some(key) => root.remove(&key).unwrap_or(Value::Null),
            None if ENVELOPE_KEYS.iter().any(|k| root.contains_key(*k)) => return Ok(None),
            None => Value::Object(root),
        };

        if mapping.is_null() {
            return Ok(None);
        }

        let quotes: BTreeMap<String, Quote> = serde_json::from_value(mapping).map_err(|e| {
            AnalyzerError::Parse(format!("bad quote mapping for {}: {}", symbol, e))
        })?;

        Ok(Some(Self {
            symbol: symbol.to_string(),
            quotes,
        }))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Quotes in chronological order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &Quote)> + ExactSizeIterator {
        self.quotes.iter().map(|(ts, q)| (ts.as_str(), q))
    }

    pub fn first(&self) -> Option<(&str, &Quote)> {
        self.quotes.first_key_value().map(|(ts, q)| (ts.as_str(), q))
    }

    pub fn last(&self) -> Option<(&str, &Quote)> {
        self.quotes.last_key_value().map(|(ts, q)| (ts.as_str(), q))
    }

    pub fn latest_timestamp(&self) -> Option<&str> {
        self.last().map(|(ts, _)| ts)
    }
}

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = f64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(v as f64)
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(v as f64)
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        v.trim().parse::<f64>().map_err(E::custom)
    }
}

fn deserialize_f64_lenient<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

fn deserialize_u64_lenient<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = deserializer.deserialize_any(LenientF64Visitor)?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
        Ok(v as u64)
    } else {
        Err(de::Error::custom(format!("volume {} is not a non-negative integer", v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_vendor_envelope() {
        let raw = br#"{
            "Meta Data": {"2. Symbol": "IBM"},
            "Time Series (5min)": {
                "2024-01-01 10:00:00": {"1. open": "11.0", "2. high": "15.0", "3. low": "10.0", "4. close": "14.0", "5. volume": "300"},
                "2024-01-01 09:00:00": {"1. open": "10.0", "2. high": "12.0", "3. low": "9.0", "4. close": "11.0", "5. volume": "100"}
            }
        }"#;

        let series = QuoteSeries::from_snapshot("IBM", raw).unwrap().unwrap();
        assert_eq!(series.symbol(), "IBM");
        assert_eq!(series.len(), 2);

        let (first_ts, first) = series.first().unwrap();
        assert_eq!(first_ts, "2024-01-01 09:00:00");
        assert_eq!(first.open, 10.0);
        assert_eq!(first.volume, 100);
        assert_eq!(series.latest_timestamp(), Some("2024-01-01 10:00:00"));
    }

    #[test]
    fn test_decode_bare_mapping_ignores_extra_fields() {
        let raw = br#"{
            "2024-01-01 09:00:00": {"open": 10, "high": 12.5, "low": 9, "close": 11, "volume": 7, "vwap": 10.9}
        }"#;

        let series = QuoteSeries::from_snapshot("MSFT", raw).unwrap().unwrap();
        let (_, quote) = series.first().unwrap();
        assert_eq!(*quote, Quote::new(10.0, 12.5, 9.0, 11.0, 7));
    }

    #[test]
    fn test_quota_note_yields_no_series() {
        let raw = br#"{"Note": "Thank you for using our API! Our standard API call frequency is 5 calls per minute."}"#;
        assert!(QuoteSeries::from_snapshot("IBM", raw).unwrap().is_none());
    }

    #[test]
    fn test_empty_object_is_empty_series() {
        let series = QuoteSeries::from_snapshot("IBM", b"{}").unwrap().unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn test_rejects_non_object_and_bad_numbers() {
        assert!(QuoteSeries::from_snapshot("IBM", b"[1, 2]").is_err());

        let raw = br#"{"2024-01-01 09:00:00": {"open": "abc", "high": 1, "low": 1, "close": 1}}"#;
        assert!(matches!(
            QuoteSeries::from_snapshot("IBM", raw),
            Err(AnalyzerError::Parse(_))
        ));
    }

    #[test]
    fn test_iteration_follows_timestamp_order() {
        let series = QuoteSeries::new(
            "X",
            vec![
                ("2024-01-02 00:00:00".to_string(), Quote::new(3.0, 3.0, 3.0, 3.0, 0)),
                ("2024-01-01 00:00:00".to_string(), Quote::new(1.0, 1.0, 1.0, 1.0, 0)),
                ("2024-01-01 12:00:00".to_string(), Quote::new(2.0, 2.0, 2.0, 2.0, 0)),
            ],
        );

        let opens: Vec<f64> = series.iter().map(|(_, q)| q.open).collect();
        assert_eq!(opens, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_average() {
        assert_eq!(Quote::new(10.0, 12.0, 9.0, 11.0, 0).average(), 10.5);
    }
}

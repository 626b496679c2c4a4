//! Freshness classification of a series against the wall clock.

use crate::quote_series::{QuoteSeries, TIMESTAMP_FORMAT};
use chrono::{Datelike, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessStatus {
    Fresh,
    Stale,
}

impl fmt::Display for FreshnessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreshnessStatus::Fresh => write!(f, "Fresh"),
            FreshnessStatus::Stale => write!(f, "Stale"),
        }
    }
}

/// Source of "now" for classification and batch dating.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Labels the series `Stale` when its latest quote's day-of-month is more
/// than one behind `now`'s day-of-month.
///
/// Only the day-of-month is compared, so month and year rollovers are not
/// accounted for. Empty series and unparsable timestamps classify as `Fresh`.
pub fn classify(series: &QuoteSeries, now: NaiveDateTime) -> FreshnessStatus {
    let Some(latest) = series.latest_timestamp() else {
        return FreshnessStatus::Fresh;
    };

    let latest = match NaiveDateTime::parse_from_str(latest, TIMESTAMP_FORMAT) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::error!(
                symbol = %series.symbol(),
                timestamp = %latest,
                error = %e,
                "Failed to parse latest quote timestamp, assuming fresh"
            );
            return FreshnessStatus::Fresh;
        }
    };

    let latest_day = latest.day() as i64;
    let now_day = now.day() as i64;

    if latest_day < now_day - 1 {
        FreshnessStatus::Stale
    } else {
        FreshnessStatus::Fresh
    }
}

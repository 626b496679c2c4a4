//! Metric computations over a chronologically sorted series.

use crate::quote_series::QuoteSeries;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Serialized as its storage key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(into = "&'static str", try_from = "String")]
pub enum MetricType {
    MaxPrice,
    BestProfitWindow,
    PriceDiff,
}

impl MetricType {
    pub const ALL: [MetricType; 3] = [
        MetricType::MaxPrice,
        MetricType::BestProfitWindow,
        MetricType::PriceDiff,
    ];

    /// Key used by the results table.
    pub fn storage_key(&self) -> &'static str {
        match self {
            MetricType::MaxPrice => "1_maxprice",
            MetricType::BestProfitWindow => "2_bestprofitwindow",
            MetricType::PriceDiff => "3_pricediff",
        }
    }
}

impl From<MetricType> for &'static str {
    fn from(metric_type: MetricType) -> Self {
        metric_type.storage_key()
    }
}

impl TryFrom<String> for MetricType {
    type Error = String;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        MetricType::ALL
            .into_iter()
            .find(|m| m.storage_key() == key)
            .ok_or_else(|| format!("unknown metric type {:?}", key))
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// Best single buy-then-sell over per-interval average prices.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfitWindow {
    NoProfit,
    Window {
        profit: f64,
        buy_timestamp: String,
        sell_timestamp: String,
    },
}

impl ProfitWindow {
    /// `profit,buy_ts,sell_ts`, or `0,-1,-1` when nothing is profitable.
    pub fn to_value(&self) -> String {
        match self {
            ProfitWindow::NoProfit => "0,-1,-1".to_string(),
            ProfitWindow::Window {
                profit,
                buy_timestamp,
                sell_timestamp,
            } => format!("{},{},{}", profit, buy_timestamp, sell_timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMetrics {
    pub max_price: f64,
    pub best_profit_window: ProfitWindow,
    pub price_diff: f64,
}

impl SeriesMetrics {
    pub fn value_of(&self, metric_type: MetricType) -> String {
        match metric_type {
            MetricType::MaxPrice => self.max_price.to_string(),
            MetricType::BestProfitWindow => self.best_profit_window.to_value(),
            MetricType::PriceDiff => self.price_diff.to_string(),
        }
    }
}

/// Runs all three computations. `None` for an empty series.
pub fn compute(series: &QuoteSeries) -> Option<SeriesMetrics> {
    Some(SeriesMetrics {
        max_price: max_price(series)?,
        best_profit_window: best_profit_window(series),
        price_diff: price_diff(series)?,
    })
}

/// Largest `high`. NaN highs are skipped; `None` when no comparable high exists.
pub fn max_price(series: &QuoteSeries) -> Option<f64> {
    series
        .iter()
        .map(|(_, q)| q.high)
        .filter(|high| !high.is_nan())
        .reduce(f64::max)
}

/// `close` of the last quote minus `open` of the first.
pub fn price_diff(series: &QuoteSeries) -> Option<f64> {
    let (_, first) = series.first()?;
    let (_, last) = series.last()?;
    Some(last.close - first.open)
}

/// Finds `buy < sell` maximizing `avg[sell] - avg[buy]`.
///
/// Equivalent to scanning sell ascending, then buy ascending, and keeping a
/// candidate only when its profit is strictly greater than the best so far
/// (starting at zero). The running minimum finds each sell's best profit; on a
/// strict improvement the earliest buy reaching that exact profit is taken, so
/// rounding ties resolve as the exhaustive scan would.
pub fn best_profit_window(series: &QuoteSeries) -> ProfitWindow {
    let timestamps: Vec<&str> = series.iter().map(|(ts, _)| ts).collect();
    let averages: Vec<f64> = series.iter().map(|(_, q)| q.average()).collect();

    let Some((buy, sell, profit)) = scan_best_window(&averages) else {
        return ProfitWindow::NoProfit;
    };

    ProfitWindow::Window {
        profit,
        buy_timestamp: timestamps[buy].to_string(),
        sell_timestamp: timestamps[sell].to_string(),
    }
}

fn scan_best_window(averages: &[f64]) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    let mut best_profit = 0.0;
    let mut min_idx: Option<usize> = None;

    for sell in 1..averages.len() {
        let candidate = averages[sell - 1];
        if !candidate.is_nan() && min_idx.is_none_or(|m| candidate < averages[m]) {
            min_idx = Some(sell - 1);
        }

        let Some(m) = min_idx else {
            continue;
        };

        let profit = averages[sell] - averages[m];
        if profit > best_profit {
            // A price above the minimum can still round to the same difference.
            let buy = (0..=m)
                .find(|&b| averages[sell] - averages[b] == profit)
                .unwrap_or(m);
            best_profit = profit;
            best = Some((buy, sell, profit));
        }
    }

    best
}

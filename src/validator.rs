use crate::quote_series::QuoteSeries;

/// A series is usable when it carries at least one quote.
///
/// Quote values themselves are not range-checked.
pub fn validate(series: Option<&QuoteSeries>) -> bool {
    series.is_some_and(|s| !s.is_empty())
}

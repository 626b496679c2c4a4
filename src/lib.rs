pub mod batch;
pub mod error;
pub mod fetcher;
pub mod freshness;
pub mod metrics;
pub mod quote_series;
pub mod report;
pub mod runner;
pub mod sink;
pub mod storage_utils;
pub mod validator;

pub use error::{AnalyzerError, Result};

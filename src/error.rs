use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum AnalyzerError {
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AnalyzerError {
    fn from(err: std::io::Error) -> Self {
        AnalyzerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AnalyzerError {
    fn from(err: serde_json::Error) -> Self {
        AnalyzerError::Parse(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(err: reqwest::Error) -> Self {
        AnalyzerError::Fetch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

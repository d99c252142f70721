use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnricherError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Failed to persist {path}: {message}")]
    Persist { path: String, message: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Failure modes of the remote metadata endpoint, split by how the caller
/// must react: quota exhaustion ends the run, anything else may be retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

impl FetchError {
    pub fn is_quota(&self) -> bool {
        matches!(self, FetchError::QuotaExceeded(_))
    }
}

pub type Result<T> = std::result::Result<T, EnricherError>;

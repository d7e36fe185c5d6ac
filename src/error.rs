use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinancialsError {
    #[error("Document could not be read: {path}: {details}")]
    DocumentUnreadable { path: String, details: String },

    #[error("Page {index} is out of range for a document with {page_count} pages")]
    PageOutOfRange { index: usize, page_count: usize },

    #[error("Extraction oracle failed: {0}")]
    OracleFailed(String),

    #[error("Extraction oracle timed out after {0} seconds")]
    OracleTimeout(u64),

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFormat(#[from] toml::de::Error),

    #[cfg(any(feature = "gemini", feature = "openai"))]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FinancialsError>;

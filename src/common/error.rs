use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No source coverage for location: {location}")]
    NoCoverage { location: String },

    #[error("Source {source_id} failed: {message}")]
    Source { source_id: String, message: String },

    #[error("Source {source_id} timed out after {elapsed_ms}ms")]
    Timeout { source_id: String, elapsed_ms: u64 },

    #[error("URL synthesis failed for {source_id}: {message}")]
    Synthesis { source_id: String, message: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

//! Error types for HatBot.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Rejected scheduler registration (empty candidate list or weight < 1).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scheduler has no registered candidates")]
    EmptyScheduler,

    /// Upstream failure inside a streamed unit of work.
    #[error("Work failed: {0}")]
    WorkFailure(String),

    #[error("Retriever unavailable: {0}")]
    RetrieverUnavailable(String),

    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    #[error("No configuration provided for model {model} under LLM provider {provider}")]
    ModelConfigMissing { provider: String, model: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate content: hash={0}")]
    DuplicateContent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

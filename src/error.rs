use crate::types::Phase;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Metrics encoding error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("could not fetch user information: {0}")]
    IdentityFetch(String),

    #[error("could not fetch server list: {0}")]
    CandidateFetch(String),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("failed to carry out {phase} test: {message}")]
    Phase { phase: Phase, message: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{0}")]
    Custom(String),
}

/// Reasons the server selector can refuse to pick a target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("server list is empty, cannot select the closest server")]
    EmptyCandidateList,

    #[error("could not find your chosen server ID {0} in the list of available servers")]
    ServerUnavailable(i64),
}

pub type Result<T> = std::result::Result<T, ExporterError>;

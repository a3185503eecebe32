use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable '{0}' not set")]
    MissingEnv(String),

    #[error("scenario '{scenario}': {message}")]
    Invalid { scenario: String, message: String },

    #[error("config defines no scenarios")]
    NoScenarios,
}

impl ConfigError {
    pub(crate) fn invalid(scenario: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            scenario: scenario.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run cancelled")]
    Cancelled,

    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("invalid collector address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("failed to connect to collector {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("failed to flush metrics: {0}")]
    Flush(#[from] tonic::Status),
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC server failed: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

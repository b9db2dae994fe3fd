use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Only `Configuration` and the initial `Connectivity` failure are fatal;
/// everything else is handled inside a cycle and reflected in the ledger.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Encoding error: value {value:?} was never seen by the {encoder} encoder")]
    Encoding { encoder: String, value: String },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] std::io::Error),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Broker(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Artifact(e.to_string())
    }
}

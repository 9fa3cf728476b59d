use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not enough candles: need {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

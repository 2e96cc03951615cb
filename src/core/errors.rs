use thiserror::Error;

#[derive(Error, Debug)]
pub enum KiokuError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("Backend rejected request: {0}")]
    Backend(String),

    #[error("Unknown testing block: {0}")]
    UnknownBlock(u8),

    #[error("Malformed record key: {0}")]
    InvalidKey(String),

    #[error("Sync worker error: {0}")]
    Worker(String),
}

impl KiokuError {
    /// Configuration errors point at a data-definition bug and must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KiokuError::UnknownBlock(_) | KiokuError::InvalidKey(_))
    }
}

impl From<std::io::Error> for KiokuError {
    fn from(error: std::io::Error) -> Self {
        KiokuError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for KiokuError {
    fn from(error: reqwest::Error) -> Self {
        KiokuError::Reqwest(Box::new(error))
    }
}

impl From<tokio::task::JoinError> for KiokuError {
    fn from(error: tokio::task::JoinError) -> Self {
        KiokuError::Worker(error.to_string())
    }
}

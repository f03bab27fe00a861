//! Error types shared by the coordinator, the state machine and the HTTP layer.

use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GaggleError>;

#[derive(Debug, Error)]
pub enum GaggleError {
    /// A required request parameter was missing or malformed.
    #[error("{0}")]
    InvalidRequest(String),

    /// The consensus engine rejected or failed to commit a change.
    #[error("{0}")]
    ConsensusProposalFailed(String),

    /// A snapshot could not be decoded during restore.
    #[error("failed to decode snapshot: {0}")]
    Decode(String),

    /// The engine already holds a configuration that conflicts with bootstrap.
    #[error("bootstrap conflict: {0}")]
    BootstrapConflict(String),

    /// The state could not be serialized for a response.
    #[error("failed to encode response: {0}")]
    Encode(String),

    /// The contact node refused our join request.
    #[error("failed to join cluster: {0}")]
    JoinRejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GaggleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GaggleError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sled::Error> for GaggleError {
    fn from(e: sled::Error) -> Self {
        GaggleError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for GaggleError {
    fn from(e: reqwest::Error) -> Self {
        GaggleError::Network(e.to_string())
    }
}

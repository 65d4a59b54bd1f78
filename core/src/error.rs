use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid job list: {0}")]
    InvalidJobList(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("io error: {0}")]
    Io(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionError {
    #[error("no stream matches: {0}")]
    NotFound(String),
    #[error("source unreachable: {0}")]
    Unreachable(String),
    #[error("unsupported source: {0}")]
    Unsupported(String),
}

impl ResolutionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolutionError::Unreachable(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferError {
    #[error("server answered with status {0}")]
    BadStatus(u16),
    #[error("transfer interrupted: {0}")]
    TransferInterrupted(String),
    #[error("filesystem error: {0}")]
    FilesystemError(String),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl TransferError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransferError::TransferInterrupted(_))
    }
}

/// Why a job ended in `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl FailureReason {
    pub fn is_transient(&self) -> bool {
        match self {
            FailureReason::Resolution(err) => err.is_transient(),
            FailureReason::Transfer(err) => err.is_transient(),
        }
    }
}

use thiserror::Error;

use crate::domain::RequestKey;
use crate::ports::PortError;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("request not found: {0}")]
    RequestNotFound(RequestKey),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("duplicate session topic: {0}")]
    DuplicateTopic(String),
    #[error("duplicate request id: {0}")]
    DuplicateRequest(RequestKey),
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error(transparent)]
    Port(#[from] PortError),
}

pub(crate) fn poisoned<T>(what: &str, err: std::sync::PoisonError<T>) -> CoordinatorError {
    CoordinatorError::Port(PortError::Transport(format!("{what} lock poisoned: {err}")))
}

use thiserror::Error;

/// Operational error taxonomy of the grading engine. Everything here is
/// recoverable and returned to the caller as a typed result; only the
/// `Database`/`Internal` variants indicate infrastructure faults or broken
/// invariants, and those abort the surrounding transaction.
#[derive(Debug, Error)]
pub(crate) enum EngineError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("scoring service unavailable: {0}")]
    ScoringUnavailable(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub(crate) type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }
}

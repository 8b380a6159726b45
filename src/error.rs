use thiserror::Error;

/// Failures surfaced to callers of [`crate::Engine`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no {0} found")]
    NotFound(&'static str),
    #[error("persistence disabled")]
    PersistenceDisabled,
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
    #[error("failed to start link loop: {0:#}")]
    Start(anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

use thiserror::Error;

/// Errors surfaced by the clustering and retention engine.
///
/// Storage failures arrive as `anyhow::Error` from the database layer and are
/// wrapped in [`EngineError::Store`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid digest: {reason}")]
    InvalidDigest { reason: String },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("cluster name space exhausted after {attempts} attempts")]
    NameSpaceExhausted { attempts: usize },
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

//! Top-level error type for the seedchain engine.

use crate::matrix::MatrixError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the engine, grouped along the lines of §7 of the spec:
/// configuration, I/O, data and resource errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("sequence exceeds max-seq-len ({len} > {max})")]
    SequenceTooLong { len: usize, max: usize },

    #[error("unresolvable target key: {0}")]
    UnresolvableTarget(u32),
}

pub type EngineResult<T> = Result<T, EngineError>;

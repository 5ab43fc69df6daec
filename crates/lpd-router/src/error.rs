//! Router error types.

use lpd_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Duplicate category: {0}")]
    DuplicateCategory(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type RouterResult<T> = Result<T, RouterError>;

//! Annotation error types.

use crate::dom::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("Hierarchy request error: {0}")]
    Hierarchy(String),

    #[error("No site profile for host: {0}")]
    UnknownSite(String),
}

pub type AnnotateResult<T> = Result<T, AnnotateError>;

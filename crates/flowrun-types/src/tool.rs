//! Error type for the tool collaborator contract.

use thiserror::Error;

use crate::shape::ShapeError;

/// Errors a tool may return from `execute`.
///
/// Every variant renders as a human-readable message; steps usually just
/// propagate it with `?`.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The tool input did not match the tool's declared input shape.
    #[error("invalid tool input: {0}")]
    InvalidInput(#[from] ShapeError),

    /// The tool ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The tool's backing service is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ToolError {
    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Unavailable(_))
    }
}

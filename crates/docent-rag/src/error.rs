//! Error types for the RAG orchestrator.

use std::time::Duration;

use docent_core::error::DocentError;

/// Errors returned by [`crate::RagService`].
///
/// A missing provider or store is not an error: the service answers with a
/// defined degraded response instead.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("query text cannot be empty")]
    InvalidQuery,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
}

impl RagError {
    /// Whether the caller can fix the request (as opposed to a server fault).
    pub fn is_client_error(&self) -> bool {
        matches!(self, RagError::InvalidQuery)
    }

    /// Classify a failure from an embedding or generation call.
    pub(crate) fn provider(stage: &'static str, err: DocentError) -> Self {
        match err {
            DocentError::Timeout(after) => RagError::Timeout { stage, after },
            other => RagError::Provider(other.to_string()),
        }
    }

    /// Classify a failure from a chunk store call.
    pub(crate) fn store(stage: &'static str, err: DocentError) -> Self {
        match err {
            DocentError::Timeout(after) => RagError::Timeout { stage, after },
            other => RagError::Store(other.to_string()),
        }
    }
}

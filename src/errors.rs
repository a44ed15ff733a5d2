// Error taxonomy for the reader pipeline.

use thiserror::Error;

/// A required field was missing or unparsable while normalizing a log entry.
/// Fatal for the whole query: it indicates a schema break worth surfacing.
#[derive(Debug, Error)]
#[error("malformed flow record: {field}: {reason}")]
pub struct MalformedRecord {
    pub field: &'static str,
    pub reason: String,
}

impl MalformedRecord {
    pub fn missing(field: &'static str) -> Self {
        Self {
            field,
            reason: "missing".to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures surfaced by an entry-listing or project-listing capability.
#[derive(Debug, Error)]
pub enum ListError {
    /// Transient; retried with backoff inside the page stream.
    #[error("rate limited")]
    RateLimited,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Anything the reader does not recognize; propagates unchanged.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ListError {
    /// Per-project failures that degrade to skipping that project's
    /// contribution instead of failing the whole query.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            ListError::PermissionDenied(_) | ListError::NotFound(_)
        )
    }
}

/// Error produced while draining a flow record stream.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Malformed(#[from] MalformedRecord),
    #[error(transparent)]
    List(#[from] ListError),
}

use lake_client::LakeClientError;
use repo_client::SourceClientError;

/// Error taxonomy shared by the ingestion and retrieval pipelines.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Terminal for the affected document; other documents continue.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 5xx or I/O failure from an external service; fails the current
    /// document or task, no automatic retry.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Recovered locally by split-and-average or aggressive trimming.
    #[error("Embedding input too large: {0}")]
    EmbeddingInputTooLarge(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<SourceClientError> for PipelineError {
    fn from(e: SourceClientError) -> Self {
        match e {
            SourceClientError::Unauthorized => PipelineError::PermissionDenied(e.to_string()),
            SourceClientError::NotFound(what) => PipelineError::NotFound(what),
            other => PipelineError::Backend(other.to_string()),
        }
    }
}

impl From<LakeClientError> for PipelineError {
    fn from(e: LakeClientError) -> Self {
        match e {
            LakeClientError::Unauthorized | LakeClientError::PermissionDenied(_) => {
                PipelineError::PermissionDenied(e.to_string())
            }
            LakeClientError::NotFound(what) => PipelineError::NotFound(what),
            LakeClientError::InvariantViolation(what) => PipelineError::InvariantViolation(what),
            other => PipelineError::Backend(other.to_string()),
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LakeClientError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("PermissionDenied: {0}")]
    PermissionDenied(String),
    #[error("NotFound: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("ResponseError: {0}")]
    ResponseError(String),
    #[error("ParsingError: {0}")]
    ParsingError(String),
    #[error("InvariantViolation: {0}")]
    InvariantViolation(String),
}

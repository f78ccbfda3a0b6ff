use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceClientError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("NotFound: {0}")]
    NotFound(String),
    #[error("ResponseError: {0}")]
    ResponseError(String),
    #[error("ParsingError: {0}")]
    ParsingError(String),
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),
}

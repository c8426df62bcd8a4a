use crate::domain::feature::ValidationError as SubmissionError;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error(transparent)]
    InvalidSubmission(#[from] SubmissionError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Payload conversion error: {0}")]
    PayloadConversionError(String),

    #[error("Publish error: {0}")]
    PublishError(String),

    #[error("Store operation timed out after {0:?}")]
    StoreTimeout(std::time::Duration),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Duplicate job id: {0}")]
    DuplicateId(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;

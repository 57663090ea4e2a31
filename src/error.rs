use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{field} must not be empty")]
    Validation { field: &'static str },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

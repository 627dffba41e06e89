use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Role code or group name missing from the static registry.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

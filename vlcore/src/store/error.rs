use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization/deserialization error: {0}")]
    Serialization(String),

    #[error("item not found: {0}")]
    NotFound(String),

    #[error("database operation error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

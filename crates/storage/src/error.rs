use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Staged data could not be (de)serialized: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

use thiserror::Error;

use crate::domain::CellError;

/// Errors from persistence, CSV and configuration I/O.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid document format - {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No saved spreadsheet with id {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Cell(#[from] CellError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

//! Error types for the securities master

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::AssetId;

/// Main error type for securities-master operations
#[derive(Error, Debug)]
pub enum SecmasterError {
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Series kind mismatch: {0}")]
    KindMismatch(String),

    #[error("Duplicate date {date} for asset {asset}")]
    DuplicateDate { asset: AssetId, date: NaiveDate },

    #[error("Asset {0} is closed")]
    AssetClosed(AssetId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No close before {date} for asset {asset}")]
    MissingClose { asset: AssetId, date: NaiveDate },

    #[error("No conversion path from {from} to {to}")]
    NoConversionPath { from: String, to: String },

    #[error("In use: {0}")]
    InUse(String),

    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Result type alias for securities-master operations
pub type Result<T> = std::result::Result<T, SecmasterError>;

impl SecmasterError {
    /// Whether a caller can recover from this error. Consistency faults
    /// signal a broken internal invariant and are terminal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SecmasterError::ConsistencyFault(_))
    }
}

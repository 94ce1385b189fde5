//! Error types for the document store.

use crate::types::DocumentId;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document not found: {collection}/{id}")]
    DocumentNotFound {
        collection: String,
        id: DocumentId,
    },

    #[error("Batch aborted at update {index}: {source}")]
    BatchAborted {
        /// Index of the update that failed validation. No update was applied.
        index: usize,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

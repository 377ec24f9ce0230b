//! Storage error handling
//!
//! Typed errors raised by the store primitives. Every variant classifies into
//! one [`ErrorCode`]; the controller façade is the only place these are
//! turned into user-facing envelopes.

use thiserror::Error;

use crate::error::ErrorCode;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// A declared key field is absent from a create payload
    #[error("Key field '{field}' is missing from the document")]
    MandatoryFieldMissing { field: String },

    /// A write would produce two live documents sharing all key-field values
    #[error("A live document with the same key fields already exists in '{collection}'")]
    DuplicateDocumentRejected { collection: String },

    /// The addressed document or embedded element does not exist
    #[error("No matching document in '{collection}'")]
    DocumentNotFound { collection: String },

    /// A foreign-key field points at a document that does not exist
    #[error("Foreign key check failed. Provided {field} '{value}' is not present in {collection}")]
    ForeignKeyNotFound {
        field: String,
        collection: String,
        value: String,
    },

    /// A document is still referenced from another collection
    #[error("Document is still referenced by '{collection}' through '{field}'")]
    DocumentInUse { collection: String, field: String },

    /// An update, delete or array insert had no effect
    #[error("The store reported no modification in '{collection}'")]
    ModifyDocumentFailed { collection: String },

    /// A value could not be coerced into an object id
    #[error("'{value}' is not a valid object id")]
    InvalidObjectId { value: String },

    /// A field holds a value of the wrong JSON type
    #[error("Field '{field}' has an unexpected type")]
    InvalidFieldType { field: String },

    /// A stored row could not be decoded as a document
    #[error("Stored document in '{collection}' is malformed: {details}")]
    CorruptDocument { collection: String, details: String },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An in-memory store lock was poisoned by a panicking writer
    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Classify this error into the user-facing taxonomy
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::MandatoryFieldMissing { .. } => ErrorCode::MandatoryFieldMissing,
            StoreError::DuplicateDocumentRejected { .. } => ErrorCode::DuplicateDocumentRejected,
            StoreError::DocumentNotFound { .. } | StoreError::ForeignKeyNotFound { .. } => {
                ErrorCode::DocumentNotFound
            }
            StoreError::DocumentInUse { .. } => ErrorCode::DocumentInUse,
            StoreError::ModifyDocumentFailed { .. } => ErrorCode::ModifyDocumentFailed,
            StoreError::InvalidObjectId { .. } | StoreError::InvalidFieldType { .. } => {
                ErrorCode::InvalidTypeGiven
            }
            StoreError::CorruptDocument { .. }
            | StoreError::Database(_)
            | StoreError::Serialization(_)
            | StoreError::LockPoisoned => ErrorCode::UnhandledError,
        }
    }

    /// Whether the caller can fix this by changing the request
    pub fn is_client_error(&self) -> bool {
        self.code() != ErrorCode::UnhandledError
    }

    pub(crate) fn not_found(collection: &str) -> Self {
        StoreError::DocumentNotFound {
            collection: collection.to_string(),
        }
    }

    pub(crate) fn duplicate(collection: &str) -> Self {
        StoreError::DuplicateDocumentRejected {
            collection: collection.to_string(),
        }
    }

    pub(crate) fn not_modified(collection: &str) -> Self {
        StoreError::ModifyDocumentFailed {
            collection: collection.to_string(),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

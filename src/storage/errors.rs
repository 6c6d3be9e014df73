//! # Storage Errors

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by models, queries and sessions
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    /// Field is not declared on the model
    #[error("Unknown field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    /// Value cannot be represented as the column type
    #[error("Cannot store {value} as {kind}")]
    TypeMismatch { kind: &'static str, value: String },

    /// Non-nullable column left empty
    #[error("Field '{0}' may not be null")]
    MissingField(String),

    /// Write addressed a record without a primary key
    #[error("Record has no primary key")]
    MissingPrimaryKey,

    /// Shared state lock was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    LockPoisoned,

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

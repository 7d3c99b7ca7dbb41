//! Error types, error codes and the [`Outcome`] type for document store operations.
//!
//! Two layers of errors exist:
//!
//! - [`DocumentStoreError`] is what backends and drivers report. Strict-form
//!   collection operations return it, wrapping classified failures in
//!   [`DocumentStoreError::Operation`].
//! - [`ErrorInfo`] is a classified failure carrying an [`ErrorCode`]. Safe-form
//!   collection operations return it inside an [`Outcome`] instead of failing.

use std::fmt;

use bson::error::Error as BsonError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Coarse classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No document matched a read.
    NotFound,
    /// A conditional write matched nothing; the stored data changed since it was read.
    RaceCondition,
    /// A write would violate the identity or a unique index.
    Duplication,
    /// The store rejected or failed to acknowledge the operation.
    DatabaseTransactionError,
    /// No configuration source supplied the required settings.
    MissingConfiguration,
    /// The caller supplied malformed input.
    InvalidRequest,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not-found",
            ErrorCode::RaceCondition => "race-condition",
            ErrorCode::Duplication => "duplication",
            ErrorCode::DatabaseTransactionError => "database-transaction-error",
            ErrorCode::MissingConfiguration => "missing-configuration",
            ErrorCode::InvalidRequest => "invalid-request",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure: an [`ErrorCode`], a human-readable message and optional
/// diagnostic detail (usually the driver's own error text).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{code}] {message}")]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub debug_info: Option<String>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), debug_info: None }
    }

    pub fn with_debug_info(mut self, debug_info: impl Into<String>) -> Self {
        self.debug_info = Some(debug_info.into());
        self
    }

    pub fn not_found() -> Self {
        Self::new(ErrorCode::NotFound, "No matching document")
    }

    pub fn race_condition() -> Self {
        Self::new(ErrorCode::RaceCondition, "Data has changed externally")
    }
}

/// Result of a safe-form operation: the value, or a classified [`ErrorInfo`].
pub type Outcome<T> = Result<T, ErrorInfo>;

/// Adapter from the safe calling convention to the strict one.
pub trait OutcomeExt<T> {
    /// Returns the value, or turns the classified failure into a [`DocumentStoreError`].
    fn unwrap_or_raise(self) -> DocumentStoreResult<T>;
}

impl<T> OutcomeExt<T> for Outcome<T> {
    fn unwrap_or_raise(self) -> DocumentStoreResult<T> {
        self.map_err(DocumentStoreError::Operation)
    }
}

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An insert or upsert hit an existing identity or unique-indexed value.
    #[error("Duplicate key in collection {collection}: {detail}")]
    DuplicateKey { collection: String, detail: String },
    /// A replacement would change the identity of the document it matched.
    #[error("Replacement would modify the immutable identity of a document in collection {0}")]
    ImmutableId(String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// Beginning, committing or aborting a transaction failed.
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// An error occurred during schema migration.
    #[error("Migration error: {0}")]
    Migration(String),
    /// A classified failure raised by a strict-form operation.
    #[error(transparent)]
    Operation(#[from] ErrorInfo),
}

impl DocumentStoreError {
    /// The classification of this error, when it carries one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            DocumentStoreError::Operation(info) => Some(info.code),
            _ => None,
        }
    }

    /// Maps a store-reported failure into the error taxonomy.
    ///
    /// Uniqueness violations become [`ErrorCode::Duplication`]; anything else the
    /// store reports is a [`ErrorCode::DatabaseTransactionError`] with the original
    /// text kept as debug info. Classified errors pass through unchanged.
    pub fn classify(self) -> ErrorInfo {
        match self {
            DocumentStoreError::Operation(info) => info,
            DocumentStoreError::DuplicateKey { collection, detail } => ErrorInfo::new(
                ErrorCode::Duplication,
                format!("Duplicated data in collection {collection}"),
            )
            .with_debug_info(detail),
            DocumentStoreError::ImmutableId(collection) => ErrorInfo::new(
                ErrorCode::DatabaseTransactionError,
                format!("Failed to update the data in collection {collection}"),
            )
            .with_debug_info("the matched document has a different identity"),
            other => ErrorInfo::new(ErrorCode::DatabaseTransactionError, "Database operation failed")
                .with_debug_info(other.to_string()),
        }
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_is_classified_as_duplication() {
        let info = DocumentStoreError::DuplicateKey {
            collection: "customers".into(),
            detail: "_id".into(),
        }
        .classify();

        assert_eq!(info.code, ErrorCode::Duplication);
        assert_eq!(info.debug_info.as_deref(), Some("_id"));
    }

    #[test]
    fn other_store_failures_keep_their_text() {
        let info = DocumentStoreError::Backend("connection reset".into()).classify();

        assert_eq!(info.code, ErrorCode::DatabaseTransactionError);
        assert!(info.debug_info.unwrap().contains("connection reset"));
    }

    #[test]
    fn strict_form_carries_the_code() {
        let err = Outcome::<()>::Err(ErrorInfo::race_condition())
            .unwrap_or_raise()
            .unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::RaceCondition));
        assert_eq!(err.to_string(), "[race-condition] Data has changed externally");
    }
}

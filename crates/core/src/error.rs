//! Unified error types for denorm.
//!
//! Messages carry a stable upper-case code prefix so callers and logs can
//! match on the failure class without parsing the rest of the text.

use tokio_rusqlite::rusqlite;

/// Boxed error returned by application compute functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for registration, recomputation, and storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A field needs recomputation but its record type has no compute function for it.
    #[error("MISSING_COMPUTE_METHOD: could not find method {method} in record type {record_type}")]
    MissingComputeMethod { method: String, record_type: String },

    /// A compute function failed.
    #[error("COMPUTE_FAILED: {field}: {source}")]
    Compute {
        field: String,
        #[source]
        source: BoxError,
    },

    /// No record type registered under this name.
    #[error("UNKNOWN_RECORD_TYPE: {0}")]
    UnknownRecordType(String),

    /// The storage backend has no table under this name.
    #[error("UNKNOWN_TABLE: {0}")]
    UnknownTable(String),

    /// The record type is registered for a different model type.
    #[error("RECORD_TYPE_MISMATCH: {0}")]
    RecordTypeMismatch(String),

    /// The record type was registered twice.
    #[error("ALREADY_REGISTERED: {0}")]
    AlreadyRegistered(String),

    /// The named field is not a denormalized field of the record type.
    #[error("UNKNOWN_FIELD: {field} on {record_type}")]
    UnknownField { record_type: String, field: String },

    /// A persisted instance did not report its key.
    #[error("MISSING_KEY: persisted {0} instance has no key")]
    MissingKey(String),

    /// A row could not be turned into a record instance.
    #[error("INVALID_ROW: {0}")]
    InvalidRow(String),

    /// A table or column name cannot be used in generated SQL.
    #[error("INVALID_IDENTIFIER: {0}")]
    InvalidIdentifier(String),

    /// The storage backend cannot evaluate the filter.
    #[error("UNSUPPORTED_FILTER: {0}")]
    UnsupportedFilter(String),

    /// A value could not be encoded for serialized storage.
    #[error("SERIALIZATION_FAILED: {0}")]
    Serialization(String),

    /// Database operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// True for configuration errors that must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingComputeMethod { .. }
                | Error::UnknownRecordType(_)
                | Error::RecordTypeMismatch(_)
                | Error::AlreadyRegistered(_)
        )
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

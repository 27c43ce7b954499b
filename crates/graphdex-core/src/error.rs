//! Structured error types, one enum per surface.
//!
//! Registration failures are fatal to the entity type and never reach the
//! write path; save and query failures surface synchronously with no
//! partial mutation behind them.

use crate::{
    id::RecordId,
    model::index::IndexKind,
    value::{FieldKind, Value},
};
use thiserror::Error as ThisError;

///
/// ConfigError
///
/// Entity-type registration failures. Surfaced at registration time,
/// fatal to startup of that entity type.
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("entity path is empty")]
    EmptyEntityPath,

    #[error("entity path '{path}' must be ASCII")]
    NonAsciiEntityPath { path: String },

    #[error("entity '{path}' is already registered")]
    AlreadyRegistered { path: String },

    #[error("entity '{child}' extends unknown parent '{parent}'")]
    UnknownParent { child: String, parent: String },

    #[error("duplicate field '{field}' on entity '{entity}'")]
    DuplicateField { entity: String, field: String },

    #[error("field name is empty on entity '{entity}'")]
    EmptyFieldName { entity: String },

    #[error("index name '{name}' exceeds max length {max}")]
    IndexNameTooLong { name: String, max: usize },

    #[error("entity '{entity}' exceeds {max} indexed fields")]
    TooManyIndexedFields { entity: String, max: usize },

    #[error("fulltext index on '{entity}.{field}' requires an explicit index name")]
    FulltextNameRequired { entity: String, field: String },

    #[error("fulltext index '{name}' would share a bucket configured {declared}")]
    FulltextBucketShared { name: String, declared: IndexKind },

    #[error("index '{name}' is configured {declared} but redeclared {requested}")]
    BucketKindConflict {
        name: String,
        declared: IndexKind,
        requested: IndexKind,
    },

    #[error(
        "entity '{entity}' declares multiple unique fields: '{first}' and '{second}'"
    )]
    MultipleUniqueFields {
        entity: String,
        first: String,
        second: String,
    },
}

///
/// StorageError
///
/// Failures originating in the storage collaborator. Transient variants
/// propagate unchanged; this layer performs no retry.
///

#[derive(Debug, ThisError)]
pub enum StorageError {
    #[error("storage timeout: {context}")]
    Timeout { context: String },

    #[error("storage unavailable: {context}")]
    Unavailable { context: String },

    #[error("unknown index bucket '{bucket}'")]
    UnknownBucket { bucket: String },

    #[error("bucket '{bucket}' is configured {declared}, operation requires {requested}")]
    BucketKindMismatch {
        bucket: String,
        declared: IndexKind,
        requested: IndexKind,
    },

    #[error("storage corruption: {message}")]
    Corruption { message: String },
}

impl StorageError {
    /// Construct a corruption error with a canonical prefix.
    pub(crate) fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}

///
/// SaveError
///
/// Save-path failures. The caller's in-memory record is left unmodified;
/// no partial index or row mutation is ever visible.
///

#[derive(Debug, ThisError)]
pub enum SaveError {
    #[error("entity '{path}' is not registered")]
    UnknownEntity { path: String },

    #[error("entity '{entity}' has no field '{field}'")]
    UnknownField { entity: String, field: String },

    #[error("field '{entity}.{field}' is declared {expected}, got value {found}")]
    ValueKindMismatch {
        entity: String,
        field: String,
        expected: FieldKind,
        found: Value,
    },

    #[error("value for '{entity}.{field}' is not indexable: {reason}")]
    NotIndexable {
        entity: String,
        field: String,
        reason: &'static str,
    },

    #[error("unique constraint violation on '{bucket}' ({field})")]
    UniqueViolation {
        bucket: String,
        field: String,
        existing: RecordId,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

///
/// QueryError
///
/// Query-path failures. A kind mismatch never silently falls back to a
/// different query kind.
///

#[derive(Debug, ThisError)]
pub enum QueryError {
    #[error("entity '{path}' is not registered")]
    UnknownEntity { path: String },

    #[error("no index named '{name}' is known")]
    UnknownIndex { name: String },

    #[error("field '{entity}.{field}' is not indexed")]
    UnindexedField { entity: String, field: String },

    #[error("bucket '{bucket}' is configured {configured}, query requires {requested}")]
    KindMismatch {
        bucket: String,
        configured: IndexKind,
        requested: IndexKind,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

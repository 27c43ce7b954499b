use graphdex_core::error::{ConfigError, QueryError, SaveError, StorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        let kind = match &err {
            ConfigError::MultipleUniqueFields { .. } => ConfigErrorKind::MultipleUniqueFields,
            ConfigError::FulltextNameRequired { .. }
            | ConfigError::FulltextBucketShared { .. }
            | ConfigError::BucketKindConflict { .. } => ConfigErrorKind::BucketMisconfigured,
            _ => ConfigErrorKind::Invalid,
        };

        Self::new(ErrorKind::Config(kind), ErrorOrigin::Registry, err.to_string())
    }
}

impl From<SaveError> for Error {
    fn from(err: SaveError) -> Self {
        match err {
            SaveError::UniqueViolation { .. } => Self::new(
                ErrorKind::Save(SaveErrorKind::UniqueViolation),
                ErrorOrigin::Index,
                err.to_string(),
            ),

            SaveError::UnknownEntity { .. } | SaveError::UnknownField { .. } => Self::new(
                ErrorKind::Save(SaveErrorKind::UnknownTarget),
                ErrorOrigin::Registry,
                err.to_string(),
            ),

            SaveError::ValueKindMismatch { .. } | SaveError::NotIndexable { .. } => Self::new(
                ErrorKind::Save(SaveErrorKind::InvalidValue),
                ErrorOrigin::Index,
                err.to_string(),
            ),

            SaveError::Storage(inner) => inner.into(),
        }
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::KindMismatch { .. } => Self::new(
                ErrorKind::Query(QueryErrorKind::KindMismatch),
                ErrorOrigin::Query,
                err.to_string(),
            ),

            QueryError::UnknownEntity { .. }
            | QueryError::UnknownIndex { .. }
            | QueryError::UnindexedField { .. } => Self::new(
                ErrorKind::Query(QueryErrorKind::UnknownTarget),
                ErrorOrigin::Query,
                err.to_string(),
            ),

            QueryError::Storage(inner) => inner.into(),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let kind = match &err {
            StorageError::Timeout { .. } | StorageError::Unavailable { .. } => {
                StoreErrorKind::Transient
            }
            StorageError::BucketKindMismatch { .. } | StorageError::UnknownBucket { .. } => {
                StoreErrorKind::KindMismatch
            }
            StorageError::Corruption { .. } => StoreErrorKind::Corruption,
        };

        Self::new(ErrorKind::Store(kind), ErrorOrigin::Store, err.to_string())
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Config(ConfigErrorKind),
    Save(SaveErrorKind),
    Query(QueryErrorKind),
    Store(StoreErrorKind),
}

///
/// ConfigErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConfigErrorKind {
    /// Structural problem in the definition itself.
    Invalid,

    /// More than one unique field in an entity hierarchy.
    MultipleUniqueFields,

    /// Fulltext naming or bucket-kind invariant breached.
    BucketMisconfigured,
}

///
/// SaveErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SaveErrorKind {
    /// The saved value is already owned by a different entity.
    UniqueViolation,

    /// Entity or field unknown to the registry.
    UnknownTarget,

    /// Value does not fit the declared field kind, or cannot index.
    InvalidValue,
}

///
/// QueryErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryErrorKind {
    /// The query kind does not match the bucket's configured kind.
    KindMismatch,

    /// Index, entity, or field unknown.
    UnknownTarget,
}

///
/// StoreErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    /// Timeout or connectivity failure; retry belongs to the caller.
    Transient,

    /// A bucket's fixed kind rejected the operation.
    KindMismatch,

    Corruption,
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, derive_more::Display)]
pub enum ErrorOrigin {
    #[display("registry")]
    Registry,
    #[display("index")]
    Index,
    #[display("query")]
    Query,
    #[display("store")]
    Store,
}

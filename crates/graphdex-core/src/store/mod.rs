//! Module: store
//! Responsibility: the storage-engine boundary and the record shape that
//! crosses it.
//! Does not own: index policy; engines apply what the coordinator planned.
//! Boundary: `db::commit` drives transactions; `db::query` drives reads.

pub mod memory;

pub use memory::MemoryEngine;

use crate::{
    error::StorageError,
    id::RecordId,
    model::index::IndexKind,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// EntityRecord
///
/// A stored node or relationship: identity, entity path, and a property
/// map. This is the unit handed to save/delete and returned by queries.
///

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: RecordId,
    pub entity_path: String,
    pub properties: BTreeMap<String, Value>,
}

impl EntityRecord {
    /// A fresh record with a generated identity.
    #[must_use]
    pub fn new(entity_path: impl Into<String>) -> Self {
        Self::with_id(RecordId::generate(), entity_path)
    }

    #[must_use]
    pub fn with_id(id: RecordId, entity_path: impl Into<String>) -> Self {
        Self {
            id,
            entity_path: entity_path.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property assignment.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(field.into(), value.into());
        self
    }

    pub fn put(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.properties.insert(field.into(), value.into());
        self
    }

    /// Clear a property; a cleared field owns no index entry after save.
    pub fn clear(&mut self, field: &str) -> &mut Self {
        self.properties.insert(field.to_string(), Value::Null);
        self
    }

    /// The effective value of a field. Absent and null are the same state.
    #[must_use]
    pub fn get(&self, field: &str) -> &Value {
        self.properties.get(field).unwrap_or(&Value::Null)
    }
}

///
/// BucketCriteria
///
/// A read request against one bucket. The engine evaluates it; the router
/// validates the kind before dispatch and never reinterprets wildcards.
///

#[derive(Clone, Debug)]
pub enum BucketCriteria {
    Exact {
        field: String,
        value: Value,
    },
    /// Inclusive on both bounds.
    Range {
        field: String,
        lo: Value,
        hi: Value,
    },
    /// `expression` passes through to the engine's evaluator uninterpreted.
    Fulltext {
        field: String,
        expression: String,
    },
}

///
/// IndexEngine
///
/// The storage collaborator. Everything here is a fast, synchronous,
/// bounded call; transient failures surface as `StorageError` and are
/// never retried at this layer.
///

pub trait IndexEngine {
    type Txn<'a>: EngineTxn
    where
        Self: 'a;

    /// Open a transaction. Index entry writes and row writes enlisted in
    /// one transaction commit or roll back together.
    fn begin(&self) -> Result<Self::Txn<'_>, StorageError>;

    /// Create a bucket if absent, atomically; returns whether it was
    /// created. The kind is fixed at first creation — a conflicting
    /// re-declaration fails with `BucketKindMismatch` instead of silently
    /// downgrading.
    fn get_or_create_bucket(&self, name: &str, kind: IndexKind)
    -> Result<bool, StorageError>;

    /// Kind recorded for a `(bucket, field)` slot, if the bucket exists
    /// and the field has been written.
    fn bucket_field_kind(
        &self,
        bucket: &str,
        field: &str,
    ) -> Result<Option<IndexKind>, StorageError>;

    /// Whether the named bucket exists and was created fulltext.
    fn bucket_is_fulltext(&self, bucket: &str) -> Result<Option<bool>, StorageError>;

    /// Evaluate criteria against one bucket. Owners return in underlying
    /// index order; a bucket that was never written matches nothing.
    fn query(&self, bucket: &str, criteria: &BucketCriteria)
    -> Result<Vec<RecordId>, StorageError>;

    fn read_row(&self, id: RecordId) -> Result<Option<EntityRecord>, StorageError>;

    /// Number of live rows for an entity path.
    fn count_rows(&self, entity_path: &str) -> Result<u64, StorageError>;
}

///
/// EngineTxn
///
/// A single atomic unit of index and row mutation. Reads through the
/// transaction observe its own uncommitted writes; readers outside it
/// observe pre-write or post-commit state only.
///

pub trait EngineTxn {
    fn put(
        &mut self,
        bucket: &str,
        field: &str,
        value: &Value,
        owner: RecordId,
    ) -> Result<(), StorageError>;

    /// Atomic get-or-create on a key slot: returns the sole existing owner
    /// without mutating, or inserts `owner` and returns it.
    fn put_if_absent(
        &mut self,
        bucket: &str,
        field: &str,
        value: &Value,
        owner: RecordId,
    ) -> Result<RecordId, StorageError>;

    fn remove(
        &mut self,
        bucket: &str,
        field: &str,
        value: &Value,
        owner: RecordId,
    ) -> Result<(), StorageError>;

    fn write_row(&mut self, record: &EntityRecord) -> Result<(), StorageError>;

    fn delete_row(&mut self, id: RecordId) -> Result<(), StorageError>;

    fn read_row(&self, id: RecordId) -> Result<Option<EntityRecord>, StorageError>;

    fn commit(self) -> Result<(), StorageError>;

    fn rollback(self);
}

//! Module: db
//! Responsibility: the public runtime handle composing registry, write
//! coordinator, and query router over one storage engine.
//! Does not own: policy details; save and query semantics live in the
//! submodules this facade sequences.

mod commit;
mod plan;
mod query;


pub use plan::CommitPlan;
pub use query::{Hits, IndexRef};

use crate::{
    error::{ConfigError, QueryError, SaveError, StorageError},
    id::RecordId,
    model::entity::EntityDef,
    registry::TypeRegistry,
    store::{EntityRecord, IndexEngine, MemoryEngine},
    value::Value,
};

///
/// Db
///

pub struct Db<E: IndexEngine = MemoryEngine> {
    registry: TypeRegistry,
    engine: E,
}

impl Db<MemoryEngine> {
    /// A database over the embedded in-memory engine.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryEngine::new())
    }
}

impl<E: IndexEngine> Db<E> {
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            registry: TypeRegistry::new(),
            engine,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Register an entity definition. Fatal to the entity type on failure;
    /// the registry is unchanged afterwards.
    pub fn register(&self, def: EntityDef) -> Result<(), ConfigError> {
        self.registry.register(def)
    }

    /// Save a record: plan index mutations from the committed state, then
    /// apply them atomically with the row write. Unique violations abort
    /// the whole save with nothing visible.
    pub fn save(&self, record: &EntityRecord) -> Result<(), SaveError> {
        let old = self.engine.read_row(record.id)?;
        let plan = plan::plan_save(&self.registry, old.as_ref(), record)?;

        commit::commit(&self.engine, &plan)
    }

    /// Idempotent get-or-create on the unique field: if `record`'s unique
    /// value is already owned, return the owning record instead of saving.
    pub fn get_or_save(&self, record: &EntityRecord) -> Result<EntityRecord, SaveError> {
        match self.save(record) {
            Ok(()) => Ok(record.clone()),
            Err(SaveError::UniqueViolation { existing, bucket, .. }) => self
                .engine
                .read_row(existing)?
                .ok_or_else(|| {
                    SaveError::Storage(StorageError::corruption(format!(
                        "unique slot owner {existing} has no stored row ('{bucket}')"
                    )))
                }),
            Err(err) => Err(err),
        }
    }

    /// Delete a record and every index entry it owns, atomically.
    /// Deleting an absent id is a no-op.
    pub fn delete(&self, id: RecordId) -> Result<(), SaveError> {
        let Some(old) = self.engine.read_row(id)? else {
            return Ok(());
        };

        let plan = plan::plan_delete(&self.registry, &old)?;

        commit::commit(&self.engine, &plan)
    }

    pub fn get(&self, id: RecordId) -> Result<Option<EntityRecord>, QueryError> {
        Ok(self.engine.read_row(id)?)
    }

    /// Number of live records for an entity path.
    pub fn count(&self, entity_path: &str) -> Result<u64, QueryError> {
        Ok(self.engine.count_rows(entity_path)?)
    }

    /// First record matching an exact lookup, in underlying-index order.
    pub fn find_one(
        &self,
        target: IndexRef<'_>,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<EntityRecord>, QueryError> {
        self.find_all(target, field, value)?.next().transpose()
    }

    /// All records matching an exact lookup.
    pub fn find_all(
        &self,
        target: IndexRef<'_>,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Hits<'_, E>, QueryError> {
        let ids = query::route_exact(&self.registry, &self.engine, target, field, &value.into())?;

        Ok(Hits::new(&self.engine, ids))
    }

    /// All records with `field` in `[lo, hi]`, both bounds inclusive.
    /// Rejected with `KindMismatch` unless the bucket is numeric.
    pub fn find_all_by_range(
        &self,
        target: IndexRef<'_>,
        field: &str,
        lo: impl Into<Value>,
        hi: impl Into<Value>,
    ) -> Result<Hits<'_, E>, QueryError> {
        let ids = query::route_range(
            &self.registry,
            &self.engine,
            target,
            field,
            &lo.into(),
            &hi.into(),
        )?;

        Ok(Hits::new(&self.engine, ids))
    }

    /// All records matching a fulltext expression against a named fulltext
    /// bucket. Wildcards pass through to the engine uninterpreted.
    pub fn find_all_by_fulltext(
        &self,
        index_name: &str,
        field: &str,
        expression: &str,
    ) -> Result<Hits<'_, E>, QueryError> {
        let ids = query::route_fulltext(
            &self.registry,
            &self.engine,
            index_name,
            field,
            expression,
        )?;

        Ok(Hits::new(&self.engine, ids))
    }
}

//! Module: db::plan
//! Responsibility: preflight planning of deterministic index mutations for
//! one entity transition.
//! Does not own: transaction sequencing or unique-guard execution.
//! Boundary: `db::commit` applies plans; all fallible validation happens
//! here, before anything touches the engine.

use crate::{
    error::SaveError,
    id::RecordId,
    model::index::IndexKind,
    registry::TypeRegistry,
    store::EntityRecord,
    value::Value,
};

///
/// IndexOp
/// One add or remove against a bucket slot. Ops are raw `(field, value)`
/// pairs; engines own the canonical key encoding.
///

#[derive(Clone, Debug)]
pub(crate) struct IndexOp {
    pub bucket: String,
    pub field: String,
    pub value: Value,
    pub owner: RecordId,
}

///
/// UniqueGuard
/// Atomic get-or-create executed before any other mutation of the save.
///

#[derive(Clone, Debug)]
pub(crate) struct UniqueGuard {
    pub bucket: String,
    pub field: String,
    pub value: Value,
    pub owner: RecordId,
}

///
/// RowOp
///

#[derive(Clone, Debug)]
pub(crate) enum RowOp {
    Write(EntityRecord),
    Delete(RecordId),
}

///
/// CommitPlan
///
/// The full mutation set for one save or delete. Safe to apply after
/// planning: apply-phase failures are engine faults, not policy faults.
///

#[derive(Debug)]
pub struct CommitPlan {
    pub(crate) entity_path: String,
    pub(crate) row: RowOp,

    /// Buckets the adds touch, with their declared kinds; ensured before
    /// the transaction opens.
    pub(crate) buckets: Vec<(String, IndexKind)>,

    pub(crate) guards: Vec<UniqueGuard>,

    /// Removes apply before adds so a changed field never holds two
    /// entries inside the transaction.
    pub(crate) removes: Vec<IndexOp>,
    pub(crate) adds: Vec<IndexOp>,
}

impl CommitPlan {
    pub(crate) fn is_index_noop(&self) -> bool {
        self.guards.is_empty() && self.removes.is_empty() && self.adds.is_empty()
    }
}

/// Plan all index mutations for a save transition.
///
/// `old` is the currently committed record (absent for a first save); the
/// diff between `old` and `new` decides which entries move. All unique
/// validation inputs are gathered here; enforcement itself runs atomically
/// at commit.
pub(crate) fn plan_save(
    registry: &TypeRegistry,
    old: Option<&EntityRecord>,
    new: &EntityRecord,
) -> Result<CommitPlan, SaveError> {
    let runtime = registry
        .runtime(&new.entity_path)
        .ok_or_else(|| SaveError::UnknownEntity {
            path: new.entity_path.clone(),
        })?;

    // Phase 1: structural validation of the incoming record.
    for (field, value) in &new.properties {
        let Some(kind) = runtime.fields.get(field) else {
            return Err(SaveError::UnknownField {
                entity: new.entity_path.clone(),
                field: field.clone(),
            });
        };

        if !value.matches_kind(*kind) {
            return Err(SaveError::ValueKindMismatch {
                entity: new.entity_path.clone(),
                field: field.clone(),
                expected: *kind,
                found: value.clone(),
            });
        }
    }

    // Phase 2: per-descriptor diffing.
    let mut plan = CommitPlan {
        entity_path: new.entity_path.clone(),
        row: RowOp::Write(new.clone()),
        buckets: Vec::new(),
        guards: Vec::new(),
        removes: Vec::new(),
        adds: Vec::new(),
    };

    for descriptor in runtime.descriptors.iter() {
        let old_value = old
            .map(|record| record.get(&descriptor.field))
            .filter(|value| !value.is_null());
        let new_value = Some(new.get(&descriptor.field)).filter(|value| !value.is_null());

        if let Some(value) = new_value
            && !value.is_indexable()
        {
            return Err(SaveError::NotIndexable {
                entity: new.entity_path.clone(),
                field: descriptor.field.clone(),
                reason: "NaN float",
            });
        }

        if old_value == new_value {
            continue;
        }

        if let Some(value) = old_value {
            plan.removes.push(IndexOp {
                bucket: descriptor.index_name.clone(),
                field: descriptor.field.clone(),
                value: value.clone(),
                owner: new.id,
            });
        }

        if let Some(value) = new_value {
            plan.buckets
                .push((descriptor.index_name.clone(), descriptor.kind));
            plan.adds.push(IndexOp {
                bucket: descriptor.index_name.clone(),
                field: descriptor.field.clone(),
                value: value.clone(),
                owner: new.id,
            });

            if descriptor.unique {
                plan.guards.push(UniqueGuard {
                    bucket: descriptor.index_name.clone(),
                    field: descriptor.field.clone(),
                    value: value.clone(),
                    owner: new.id,
                });
            }
        }
    }

    Ok(plan)
}

/// Plan the removal of every index entry a stored record owns, plus its
/// row, for delete.
pub(crate) fn plan_delete(
    registry: &TypeRegistry,
    old: &EntityRecord,
) -> Result<CommitPlan, SaveError> {
    let runtime = registry
        .runtime(&old.entity_path)
        .ok_or_else(|| SaveError::UnknownEntity {
            path: old.entity_path.clone(),
        })?;

    let mut plan = CommitPlan {
        entity_path: old.entity_path.clone(),
        row: RowOp::Delete(old.id),
        buckets: Vec::new(),
        guards: Vec::new(),
        removes: Vec::new(),
        adds: Vec::new(),
    };

    for descriptor in runtime.descriptors.iter() {
        let value = old.get(&descriptor.field);
        if value.is_null() {
            continue;
        }

        plan.removes.push(IndexOp {
            bucket: descriptor.index_name.clone(),
            field: descriptor.field.clone(),
            value: value.clone(),
            owner: old.id,
        });
    }

    Ok(plan)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::entity::{EntityDef, IndexSpec},
        value::FieldKind,
    };

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry
            .register(
                EntityDef::new("app::Person")
                    .indexed_field("name", FieldKind::Text, IndexSpec::unique())
                    .indexed_field("age", FieldKind::Int, IndexSpec::indexed())
                    .field("bio", FieldKind::Text),
            )
            .expect("register person");

        registry
    }

    #[test]
    fn first_save_adds_and_guards() {
        let registry = registry();
        let record = EntityRecord::new("app::Person").set("name", "mark").set("age", 33);

        let plan = plan_save(&registry, None, &record).expect("plan save");

        assert!(plan.removes.is_empty());
        assert_eq!(plan.adds.len(), 2);
        assert_eq!(plan.guards.len(), 1);
        assert_eq!(plan.guards[0].field, "name");
    }

    #[test]
    fn unchanged_fields_plan_no_ops() {
        let registry = registry();
        let record = EntityRecord::new("app::Person").set("name", "mark").set("age", 33);

        let plan = plan_save(&registry, Some(&record), &record).expect("plan save");

        assert!(plan.is_index_noop());
    }

    #[test]
    fn changed_field_removes_old_and_adds_new() {
        let registry = registry();
        let old = EntityRecord::new("app::Person").set("name", "mark").set("age", 33);
        let new = old.clone().set("age", 34);

        let plan = plan_save(&registry, Some(&old), &new).expect("plan save");

        assert_eq!(plan.removes.len(), 1);
        assert_eq!(plan.adds.len(), 1);
        assert_eq!(plan.removes[0].value, Value::Int(33));
        assert_eq!(plan.adds[0].value, Value::Int(34));
        // the unchanged unique field needs no guard
        assert!(plan.guards.is_empty());
    }

    #[test]
    fn clearing_a_field_plans_a_remove_only() {
        let registry = registry();
        let old = EntityRecord::new("app::Person").set("name", "mark").set("age", 33);
        let mut new = old.clone();
        new.clear("age");

        let plan = plan_save(&registry, Some(&old), &new).expect("plan save");

        assert_eq!(plan.removes.len(), 1);
        assert!(plan.adds.is_empty());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let registry = registry();
        let record = EntityRecord::new("app::Person").set("nickname", "mark");

        assert!(matches!(
            plan_save(&registry, None, &record),
            Err(SaveError::UnknownField { .. })
        ));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let registry = registry();
        let record = EntityRecord::new("app::Person").set("age", "old");

        assert!(matches!(
            plan_save(&registry, None, &record),
            Err(SaveError::ValueKindMismatch { .. })
        ));
    }

    #[test]
    fn delete_plans_removes_for_owned_entries() {
        let registry = registry();
        let record = EntityRecord::new("app::Person").set("name", "mark").set("age", 33);

        let plan = plan_delete(&registry, &record).expect("plan delete");

        assert_eq!(plan.removes.len(), 2);
        assert!(plan.adds.is_empty());
        assert!(matches!(plan.row, RowOp::Delete(id) if id == record.id));
    }
}

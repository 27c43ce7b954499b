//! Module: db::commit
//! Responsibility: atomic application of a planned save or delete.
//! Does not own: plan synthesis; the plan is authoritative and apply never
//! re-derives semantics from entity contents.
//! Boundary: unique guards execute first, inside the same transaction as
//! every other mutation, so a violation aborts with nothing visible.

use crate::{
    db::plan::{CommitPlan, RowOp},
    error::{SaveError, StorageError},
    obs::{ObsEvent, record},
    store::{EngineTxn, IndexEngine},
};

/// Apply a commit plan against the engine.
///
/// Ordering contract:
/// 1. ensure buckets exist (atomic per bucket, kind fixed at creation);
/// 2. open one transaction;
/// 3. execute unique guards — a foreign owner aborts the whole save;
/// 4. apply removes, then adds, then the row write;
/// 5. commit.
///
/// Any failure before step 5 leaves no observable mutation.
pub(crate) fn commit<E: IndexEngine>(engine: &E, plan: &CommitPlan) -> Result<(), SaveError> {
    // Phase 1: lazy bucket creation, outside the transaction. Creation is
    // idempotent and survives an aborted save by design of the engine
    // boundary.
    for (bucket, kind) in &plan.buckets {
        if engine.get_or_create_bucket(bucket, *kind)? {
            record(&ObsEvent::BucketCreated {
                bucket: bucket.clone(),
                kind: *kind,
            });
        }
    }

    // Phase 2: guards run before any mutation of this save.
    let mut txn = engine.begin()?;

    for guard in &plan.guards {
        let existing = txn.put_if_absent(&guard.bucket, &guard.field, &guard.value, guard.owner)?;
        if existing == guard.owner {
            continue;
        }

        // The slot belongs to someone else. Verify against the stored row:
        // a fingerprinted key may collide, and a collision is corruption,
        // not a violation.
        let verdict = match txn.read_row(existing)? {
            Some(row) if *row.get(&guard.field) == guard.value => SaveError::UniqueViolation {
                bucket: guard.bucket.clone(),
                field: guard.field.clone(),
                existing,
            },
            Some(_) => SaveError::Storage(StorageError::corruption(format!(
                "index canonical collision in '{}' ({})",
                guard.bucket, guard.field
            ))),
            None => SaveError::Storage(StorageError::corruption(format!(
                "unique slot owner {existing} has no stored row ('{}')",
                guard.bucket
            ))),
        };

        txn.rollback();

        if matches!(verdict, SaveError::UniqueViolation { .. }) {
            record(&ObsEvent::UniqueViolation {
                bucket: guard.bucket.clone(),
                field: guard.field.clone(),
            });
        }

        return Err(verdict);
    }

    // Phase 3: removes before adds, so a changed field never carries two
    // live entries; then the row itself.
    for op in &plan.removes {
        txn.remove(&op.bucket, &op.field, &op.value, op.owner)?;
    }
    for op in &plan.adds {
        txn.put(&op.bucket, &op.field, &op.value, op.owner)?;
    }

    match &plan.row {
        RowOp::Write(row) => txn.write_row(row)?,
        RowOp::Delete(id) => txn.delete_row(*id)?,
    }

    txn.commit()?;

    if !plan.is_index_noop() {
        record(&ObsEvent::IndexDelta {
            entity_path: plan.entity_path.clone(),
            adds: plan.adds.len() as u64,
            removes: plan.removes.len() as u64,
        });
    }

    Ok(())
}

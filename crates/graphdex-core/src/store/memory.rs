//! Module: store::memory
//! Responsibility: transactional in-memory engine used as the default
//! collaborator and test harness.
//! Does not own: descriptor policy; kind checks here are a storage-level
//! backstop, the router rejects mismatches first.
//! Boundary: one write lock spans a whole transaction, so the unique
//! check-and-insert and bucket creation are single atomic steps.

use crate::{
    error::StorageError,
    id::RecordId,
    key::{KeyEncodeError, encode_index_key, encode_range_bounds},
    model::index::IndexKind,
    store::{BucketCriteria, EngineTxn, EntityRecord, IndexEngine},
    value::Value,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

///
/// MemoryEngine
///

#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: RwLock<EngineState>,
}

#[derive(Debug, Default)]
struct EngineState {
    buckets: BTreeMap<String, Bucket>,
    rows: BTreeMap<RecordId, EntityRecord>,
}

///
/// Bucket
///

#[derive(Debug)]
struct Bucket {
    /// Fixed at creation; fulltext buckets never hold non-fulltext slots.
    fulltext: bool,

    /// Kind observed per field at first write.
    field_kinds: BTreeMap<String, IndexKind>,

    /// Encoded key -> owner slot, in canonical key order.
    slots: BTreeMap<Vec<u8>, Slot>,
}

impl Bucket {
    fn new(kind: IndexKind) -> Self {
        Self {
            fulltext: kind == IndexKind::Fulltext,
            field_kinds: BTreeMap::new(),
            slots: BTreeMap::new(),
        }
    }

    fn declared_kind(&self, field: &str) -> IndexKind {
        if self.fulltext {
            IndexKind::Fulltext
        } else {
            self.field_kinds.get(field).copied().unwrap_or(IndexKind::Exact)
        }
    }
}

///
/// Slot
///

#[derive(Debug, Default)]
struct Slot {
    owners: BTreeSet<RecordId>,

    /// Original `(field, text)` the key was derived from; kept for
    /// fulltext evaluation only.
    source: Option<(String, String)>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state
            .read()
            .expect("engine RwLock poisoned while acquiring read lock")
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state
            .write()
            .expect("engine RwLock poisoned while acquiring write lock")
    }
}

impl IndexEngine for MemoryEngine {
    type Txn<'a>
        = MemoryTxn<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Txn<'_>, StorageError> {
        Ok(MemoryTxn {
            state: self.write(),
            undo: Vec::new(),
            finished: false,
        })
    }

    fn get_or_create_bucket(&self, name: &str, kind: IndexKind) -> Result<bool, StorageError> {
        let mut state = self.write();

        if let Some(bucket) = state.buckets.get(name) {
            if bucket.fulltext != (kind == IndexKind::Fulltext) {
                return Err(StorageError::BucketKindMismatch {
                    bucket: name.to_string(),
                    declared: if bucket.fulltext {
                        IndexKind::Fulltext
                    } else {
                        IndexKind::Exact
                    },
                    requested: kind,
                });
            }

            return Ok(false);
        }

        state.buckets.insert(name.to_string(), Bucket::new(kind));

        Ok(true)
    }

    fn bucket_field_kind(
        &self,
        bucket: &str,
        field: &str,
    ) -> Result<Option<IndexKind>, StorageError> {
        let state = self.read();

        Ok(state.buckets.get(bucket).map(|b| b.declared_kind(field)))
    }

    fn bucket_is_fulltext(&self, bucket: &str) -> Result<Option<bool>, StorageError> {
        Ok(self.read().buckets.get(bucket).map(|b| b.fulltext))
    }

    fn query(
        &self,
        bucket: &str,
        criteria: &BucketCriteria,
    ) -> Result<Vec<RecordId>, StorageError> {
        let state = self.read();

        // A bucket that was never written matches nothing.
        let Some(bucket_state) = state.buckets.get(bucket) else {
            return Ok(Vec::new());
        };

        match criteria {
            BucketCriteria::Exact { field, value } => {
                if bucket_state.fulltext {
                    return Err(StorageError::BucketKindMismatch {
                        bucket: bucket.to_string(),
                        declared: IndexKind::Fulltext,
                        requested: IndexKind::Exact,
                    });
                }

                let key = match encode_index_key(field, value) {
                    Ok(key) => key,
                    // Null owns no entry; it matches nothing.
                    Err(KeyEncodeError::NullComponent) => return Ok(Vec::new()),
                    Err(err) => return Err(StorageError::corruption(err.to_string())),
                };

                Ok(bucket_state
                    .slots
                    .get(&key)
                    .map(|slot| slot.owners.iter().copied().collect())
                    .unwrap_or_default())
            }

            BucketCriteria::Range { field, lo, hi } => {
                let declared = bucket_state.declared_kind(field);
                if declared != IndexKind::Numeric {
                    return Err(StorageError::BucketKindMismatch {
                        bucket: bucket.to_string(),
                        declared,
                        requested: IndexKind::Numeric,
                    });
                }

                let (lo_key, hi_key) = match encode_range_bounds(field, lo, hi) {
                    Ok(bounds) => bounds,
                    Err(KeyEncodeError::NullComponent) => return Ok(Vec::new()),
                    Err(err) => return Err(StorageError::corruption(err.to_string())),
                };

                if lo_key > hi_key {
                    return Ok(Vec::new());
                }

                let mut seen = BTreeSet::new();
                let mut out = Vec::new();
                for slot in bucket_state.slots.range(lo_key..=hi_key).map(|(_, s)| s) {
                    for owner in &slot.owners {
                        if seen.insert(*owner) {
                            out.push(*owner);
                        }
                    }
                }

                Ok(out)
            }

            BucketCriteria::Fulltext { field, expression } => {
                if !bucket_state.fulltext {
                    return Err(StorageError::BucketKindMismatch {
                        bucket: bucket.to_string(),
                        declared: bucket_state.declared_kind(field),
                        requested: IndexKind::Fulltext,
                    });
                }

                let mut seen = BTreeSet::new();
                let mut out = Vec::new();
                for slot in bucket_state.slots.values() {
                    let Some((slot_field, text)) = &slot.source else {
                        continue;
                    };
                    if slot_field != field || !fulltext_matches(expression, text) {
                        continue;
                    }
                    for owner in &slot.owners {
                        if seen.insert(*owner) {
                            out.push(*owner);
                        }
                    }
                }

                Ok(out)
            }
        }
    }

    fn read_row(&self, id: RecordId) -> Result<Option<EntityRecord>, StorageError> {
        Ok(self.read().rows.get(&id).cloned())
    }

    fn count_rows(&self, entity_path: &str) -> Result<u64, StorageError> {
        let count = self
            .read()
            .rows
            .values()
            .filter(|row| row.entity_path == entity_path)
            .count();

        Ok(count as u64)
    }
}

///
/// MemoryTxn
///
/// Holds the engine write lock for its whole lifetime: writers serialize,
/// readers observe pre-write or post-commit state, and the unique
/// put-if-absent is a single check-and-act step. Mutations apply eagerly
/// with an undo log; dropping an uncommitted transaction rolls back.
///

pub struct MemoryTxn<'a> {
    state: RwLockWriteGuard<'a, EngineState>,
    undo: Vec<UndoOp>,
    finished: bool,
}

enum UndoOp {
    RemoveOwner {
        bucket: String,
        key: Vec<u8>,
        owner: RecordId,
    },
    ReinsertOwner {
        bucket: String,
        key: Vec<u8>,
        owner: RecordId,
        source: Option<(String, String)>,
    },
    ForgetFieldKind {
        bucket: String,
        field: String,
    },
    RestoreRow {
        id: RecordId,
        previous: Option<EntityRecord>,
    },
}

impl MemoryTxn<'_> {
    fn bucket_mut(&mut self, bucket: &str) -> Result<&mut Bucket, StorageError> {
        self.state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::UnknownBucket {
                bucket: bucket.to_string(),
            })
    }

    // Record the field kind observed at first write; conflicting kinds on
    // one slot are a mismatch, never a downgrade.
    fn admit_value(
        &mut self,
        bucket: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<u8>, StorageError> {
        let bucket_state = self.bucket_mut(bucket)?;

        let written_kind = match value {
            Value::Text(_) if bucket_state.fulltext => IndexKind::Fulltext,
            Value::Text(_) => IndexKind::Exact,
            Value::Int(_) | Value::Float(_) => IndexKind::Numeric,
            Value::Null => {
                return Err(StorageError::corruption(
                    "null value reached the index write path",
                ));
            }
        };

        if bucket_state.fulltext && written_kind != IndexKind::Fulltext {
            return Err(StorageError::BucketKindMismatch {
                bucket: bucket.to_string(),
                declared: IndexKind::Fulltext,
                requested: written_kind,
            });
        }

        match bucket_state.field_kinds.get(field) {
            Some(existing) if *existing != written_kind => {
                return Err(StorageError::BucketKindMismatch {
                    bucket: bucket.to_string(),
                    declared: *existing,
                    requested: written_kind,
                });
            }
            Some(_) => {}
            None => {
                bucket_state
                    .field_kinds
                    .insert(field.to_string(), written_kind);
                self.undo.push(UndoOp::ForgetFieldKind {
                    bucket: bucket.to_string(),
                    field: field.to_string(),
                });
            }
        }

        encode_index_key(field, value).map_err(|err| StorageError::corruption(err.to_string()))
    }

    fn insert_owner(
        &mut self,
        bucket: &str,
        key: Vec<u8>,
        field: &str,
        value: &Value,
        owner: RecordId,
    ) -> Result<(), StorageError> {
        let fulltext = self.bucket_mut(bucket)?.fulltext;
        let slot = self
            .bucket_mut(bucket)?
            .slots
            .entry(key.clone())
            .or_default();

        if slot.owners.insert(owner) {
            if fulltext && slot.source.is_none() {
                if let Value::Text(text) = value {
                    slot.source = Some((field.to_string(), text.clone()));
                }
            }

            self.undo.push(UndoOp::RemoveOwner {
                bucket: bucket.to_string(),
                key,
                owner,
            });
        }

        Ok(())
    }

    fn apply_undo(&mut self) {
        // Reverse order restores the exact pre-transaction state.
        while let Some(op) = self.undo.pop() {
            match op {
                UndoOp::RemoveOwner { bucket, key, owner } => {
                    if let Some(bucket_state) = self.state.buckets.get_mut(&bucket)
                        && let Some(slot) = bucket_state.slots.get_mut(&key)
                    {
                        slot.owners.remove(&owner);
                        if slot.owners.is_empty() {
                            bucket_state.slots.remove(&key);
                        }
                    }
                }
                UndoOp::ReinsertOwner {
                    bucket,
                    key,
                    owner,
                    source,
                } => {
                    if let Some(bucket_state) = self.state.buckets.get_mut(&bucket) {
                        let slot = bucket_state.slots.entry(key).or_default();
                        slot.owners.insert(owner);
                        if slot.source.is_none() {
                            slot.source = source;
                        }
                    }
                }
                UndoOp::ForgetFieldKind { bucket, field } => {
                    if let Some(bucket_state) = self.state.buckets.get_mut(&bucket) {
                        bucket_state.field_kinds.remove(&field);
                    }
                }
                UndoOp::RestoreRow { id, previous } => {
                    match previous {
                        Some(row) => self.state.rows.insert(id, row),
                        None => self.state.rows.remove(&id),
                    };
                }
            }
        }
    }
}

impl EngineTxn for MemoryTxn<'_> {
    fn put(
        &mut self,
        bucket: &str,
        field: &str,
        value: &Value,
        owner: RecordId,
    ) -> Result<(), StorageError> {
        let key = self.admit_value(bucket, field, value)?;

        self.insert_owner(bucket, key, field, value, owner)
    }

    fn put_if_absent(
        &mut self,
        bucket: &str,
        field: &str,
        value: &Value,
        owner: RecordId,
    ) -> Result<RecordId, StorageError> {
        let key = self.admit_value(bucket, field, value)?;

        let occupied = {
            let slot = self.bucket_mut(bucket)?.slots.get(&key);
            match slot {
                Some(slot) if !slot.owners.is_empty() => {
                    if slot.owners.len() > 1 {
                        return Err(StorageError::corruption(format!(
                            "unique slot in '{bucket}' holds {} owners",
                            slot.owners.len()
                        )));
                    }
                    slot.owners.iter().next().copied()
                }
                _ => None,
            }
        };

        if let Some(existing) = occupied {
            return Ok(existing);
        }

        self.insert_owner(bucket, key, field, value, owner)?;

        Ok(owner)
    }

    fn remove(
        &mut self,
        bucket: &str,
        field: &str,
        value: &Value,
        owner: RecordId,
    ) -> Result<(), StorageError> {
        let key =
            encode_index_key(field, value).map_err(|err| StorageError::corruption(err.to_string()))?;

        let bucket_state = self.bucket_mut(bucket)?;
        let Some(slot) = bucket_state.slots.get_mut(&key) else {
            return Err(StorageError::corruption(format!(
                "index entry missing during removal from '{bucket}' ({field})"
            )));
        };

        if !slot.owners.remove(&owner) {
            return Err(StorageError::corruption(format!(
                "index entry does not own {owner} during removal from '{bucket}' ({field})"
            )));
        }

        let source = slot.source.clone();
        if slot.owners.is_empty() {
            bucket_state.slots.remove(&key);
        }

        self.undo.push(UndoOp::ReinsertOwner {
            bucket: bucket.to_string(),
            key,
            owner,
            source,
        });

        Ok(())
    }

    fn write_row(&mut self, record: &EntityRecord) -> Result<(), StorageError> {
        let previous = self.state.rows.insert(record.id, record.clone());
        self.undo.push(UndoOp::RestoreRow {
            id: record.id,
            previous,
        });

        Ok(())
    }

    fn delete_row(&mut self, id: RecordId) -> Result<(), StorageError> {
        let previous = self.state.rows.remove(&id);
        self.undo.push(UndoOp::RestoreRow { id, previous });

        Ok(())
    }

    fn read_row(&self, id: RecordId) -> Result<Option<EntityRecord>, StorageError> {
        Ok(self.state.rows.get(&id).cloned())
    }

    fn commit(mut self) -> Result<(), StorageError> {
        self.finished = true;
        self.undo.clear();

        Ok(())
    }

    fn rollback(mut self) {
        self.apply_undo();
        self.finished = true;
    }
}

impl Drop for MemoryTxn<'_> {
    fn drop(&mut self) {
        // An abandoned transaction must not leak partial writes.
        if !self.finished {
            self.apply_undo();
        }
    }
}

/// Evaluate a fulltext expression against stored text.
///
/// Terms are whitespace-separated and AND-ed; `*` is a multi-character
/// wildcard anywhere in a term. Matching is case-insensitive over
/// alphanumeric tokens of the stored text.
fn fulltext_matches(expression: &str, text: &str) -> bool {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return false;
    }

    let mut terms = expression.split_whitespace().peekable();
    if terms.peek().is_none() {
        return false;
    }

    terms.all(|term| {
        let term = term.to_lowercase();
        tokens.iter().any(|token| wildcard_match(&term, token))
    })
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// Iterative glob with backtracking over the last `*`.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '*' || pattern[p] == text[t]) {
            if pattern[p] == '*' {
                star = Some(p);
                resume = t;
                p += 1;
            } else {
                p += 1;
                t += 1;
            }
        } else if let Some(star_pos) = star {
            p = star_pos + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_bucket(name: &str, kind: IndexKind) -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .get_or_create_bucket(name, kind)
            .expect("create bucket");

        engine
    }

    fn owner(n: u128) -> RecordId {
        RecordId::from_parts(1, n)
    }

    #[test]
    fn bucket_kind_is_fixed_at_creation() {
        let engine = engine_with_bucket("Person", IndexKind::Exact);

        assert!(!engine
            .get_or_create_bucket("Person", IndexKind::Numeric)
            .expect("exact and numeric share the non-fulltext family"));
        assert!(matches!(
            engine.get_or_create_bucket("Person", IndexKind::Fulltext),
            Err(StorageError::BucketKindMismatch { .. })
        ));
    }

    #[test]
    fn put_if_absent_returns_existing_owner_without_mutating() {
        let engine = engine_with_bucket("Person", IndexKind::Exact);
        let (first, second) = (owner(1), owner(2));

        let mut txn = engine.begin().expect("begin");
        let value = Value::from("mark");
        assert_eq!(
            txn.put_if_absent("Person", "name", &value, first).expect("first insert"),
            first
        );
        assert_eq!(
            txn.put_if_absent("Person", "name", &value, second).expect("second insert"),
            first
        );
        txn.commit().expect("commit");

        let hits = engine
            .query(
                "Person",
                &BucketCriteria::Exact {
                    field: "name".to_string(),
                    value: Value::from("mark"),
                },
            )
            .expect("query");

        assert_eq!(hits, vec![first]);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let engine = engine_with_bucket("Person", IndexKind::Exact);

        {
            let mut txn = engine.begin().expect("begin");
            txn.put("Person", "name", &Value::from("mark"), owner(1))
                .expect("put");
            let record = EntityRecord::with_id(owner(1), "app::Person");
            txn.write_row(&record).expect("write row");
            // dropped without commit
        }

        let hits = engine
            .query(
                "Person",
                &BucketCriteria::Exact {
                    field: "name".to_string(),
                    value: Value::from("mark"),
                },
            )
            .expect("query");

        assert!(hits.is_empty());
        assert_eq!(engine.count_rows("app::Person").expect("count"), 0);
    }

    #[test]
    fn explicit_rollback_restores_removed_entries() {
        let engine = engine_with_bucket("Person", IndexKind::Exact);

        let mut txn = engine.begin().expect("begin");
        txn.put("Person", "name", &Value::from("mark"), owner(1))
            .expect("put");
        txn.commit().expect("commit");

        let txn = {
            let mut txn = engine.begin().expect("begin");
            txn.remove("Person", "name", &Value::from("mark"), owner(1))
                .expect("remove");
            txn
        };
        txn.rollback();

        let hits = engine
            .query(
                "Person",
                &BucketCriteria::Exact {
                    field: "name".to_string(),
                    value: Value::from("mark"),
                },
            )
            .expect("query");

        assert_eq!(hits, vec![owner(1)]);
    }

    #[test]
    fn range_query_is_inclusive_on_both_bounds() {
        let engine = engine_with_bucket("Person", IndexKind::Numeric);

        let mut txn = engine.begin().expect("begin");
        for (n, age) in [19i64, 20, 40, 41].iter().enumerate() {
            txn.put("Person", "age", &Value::Int(*age), owner(n as u128 + 1))
                .expect("put");
        }
        txn.commit().expect("commit");

        let hits = engine
            .query(
                "Person",
                &BucketCriteria::Range {
                    field: "age".to_string(),
                    lo: Value::Int(20),
                    hi: Value::Int(40),
                },
            )
            .expect("range query");

        assert_eq!(hits, vec![owner(2), owner(3)]);
    }

    #[test]
    fn range_query_on_text_slot_is_a_kind_mismatch() {
        let engine = engine_with_bucket("Person", IndexKind::Exact);

        let mut txn = engine.begin().expect("begin");
        txn.put("Person", "name", &Value::from("mark"), owner(1))
            .expect("put");
        txn.commit().expect("commit");

        assert!(matches!(
            engine.query(
                "Person",
                &BucketCriteria::Range {
                    field: "name".to_string(),
                    lo: Value::from("a"),
                    hi: Value::from("z"),
                },
            ),
            Err(StorageError::BucketKindMismatch { .. })
        ));
    }

    #[test]
    fn fulltext_matches_wildcard_terms() {
        let engine = engine_with_bucket("people-search", IndexKind::Fulltext);

        let mut txn = engine.begin().expect("begin");
        for (n, name) in ["mark", "martha", "john"].iter().enumerate() {
            txn.put(
                "people-search",
                "name",
                &Value::from(*name),
                owner(n as u128 + 1),
            )
            .expect("put");
        }
        txn.commit().expect("commit");

        let hits = engine
            .query(
                "people-search",
                &BucketCriteria::Fulltext {
                    field: "name".to_string(),
                    expression: "ma*".to_string(),
                },
            )
            .expect("fulltext query");

        assert_eq!(hits, vec![owner(1), owner(2)]);
    }

    #[test]
    fn wildcard_match_covers_positions() {
        assert!(wildcard_match("ma*", "mark"));
        assert!(wildcard_match("*ark", "mark"));
        assert!(wildcard_match("m*k", "mark"));
        assert!(wildcard_match("mark", "mark"));
        assert!(!wildcard_match("ma*", "john"));
        assert!(!wildcard_match("mark", "mar"));
        assert!(wildcard_match("*", "anything"));
    }

    #[test]
    fn queries_on_unwritten_buckets_match_nothing() {
        let engine = MemoryEngine::new();

        let hits = engine
            .query(
                "Person",
                &BucketCriteria::Exact {
                    field: "name".to_string(),
                    value: Value::from("mark"),
                },
            )
            .expect("query");

        assert!(hits.is_empty());
    }
}

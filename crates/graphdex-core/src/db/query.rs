//! Module: db::query
//! Responsibility: routing lookups to the right bucket and validating the
//! requested kind before dispatch.
//! Does not own: expression evaluation; wildcard syntax passes through to
//! the engine uninterpreted.
//! Boundary: a kind mismatch is an error here, never a silent fallback.

use crate::{
    error::QueryError,
    id::RecordId,
    model::index::IndexKind,
    registry::TypeRegistry,
    store::{BucketCriteria, EntityRecord, IndexEngine},
    value::Value,
};

///
/// IndexRef
/// Query target: an explicit bucket name, or an entity whose registered
/// descriptor infers the bucket.
///

#[derive(Clone, Copy, Debug)]
pub enum IndexRef<'a> {
    Named(&'a str),
    Entity(&'a str),
}

impl<'a> IndexRef<'a> {
    #[must_use]
    pub const fn named(name: &'a str) -> Self {
        Self::Named(name)
    }

    #[must_use]
    pub const fn entity(path: &'a str) -> Self {
        Self::Entity(path)
    }
}

/// The bucket a query resolved to, with the kind its field is configured.
struct ResolvedTarget {
    bucket: String,
    configured: IndexKind,
}

/// Resolve a query target through the registry, falling back to the
/// engine's observed configuration for buckets the registry never
/// declared (generic-path creations).
fn resolve_target<E: IndexEngine>(
    registry: &TypeRegistry,
    engine: &E,
    target: IndexRef<'_>,
    field: &str,
) -> Result<ResolvedTarget, QueryError> {
    match target {
        IndexRef::Entity(path) => {
            let Some(descriptor) = registry.resolve(path, field) else {
                if registry.is_registered(path) {
                    return Err(QueryError::UnindexedField {
                        entity: path.to_string(),
                        field: field.to_string(),
                    });
                }
                return Err(QueryError::UnknownEntity {
                    path: path.to_string(),
                });
            };

            Ok(ResolvedTarget {
                bucket: descriptor.index_name,
                configured: descriptor.kind,
            })
        }

        IndexRef::Named(name) => {
            if let Some(configured) = registry.bucket_field_kind(name, field) {
                return Ok(ResolvedTarget {
                    bucket: name.to_string(),
                    configured,
                });
            }

            let engine_fulltext = engine.bucket_is_fulltext(name)?;

            if registry.bucket_known(name) || engine_fulltext.is_some() {
                // Known bucket, unseen field: fulltext buckets stay
                // fulltext; other slots default to exact semantics, the
                // same default a generic-path creation gets.
                let configured = if engine_fulltext == Some(true)
                    || registry.bucket_declared_fulltext(name)
                {
                    IndexKind::Fulltext
                } else {
                    engine.bucket_field_kind(name, field)?.unwrap_or(IndexKind::Exact)
                };

                return Ok(ResolvedTarget {
                    bucket: name.to_string(),
                    configured,
                });
            }

            Err(QueryError::UnknownIndex {
                name: name.to_string(),
            })
        }
    }
}

fn ensure_kind(
    target: &ResolvedTarget,
    requested: IndexKind,
    allowed: &[IndexKind],
) -> Result<(), QueryError> {
    if allowed.contains(&target.configured) {
        return Ok(());
    }

    Err(QueryError::KindMismatch {
        bucket: target.bucket.clone(),
        configured: target.configured,
        requested,
    })
}

pub(crate) fn route_exact<E: IndexEngine>(
    registry: &TypeRegistry,
    engine: &E,
    target: IndexRef<'_>,
    field: &str,
    value: &Value,
) -> Result<Vec<RecordId>, QueryError> {
    let resolved = resolve_target(registry, engine, target, field)?;
    // Equality is supported by exact and numeric buckets alike.
    ensure_kind(
        &resolved,
        IndexKind::Exact,
        &[IndexKind::Exact, IndexKind::Numeric],
    )?;

    let criteria = BucketCriteria::Exact {
        field: field.to_string(),
        value: value.clone(),
    };

    Ok(engine.query(&resolved.bucket, &criteria)?)
}

pub(crate) fn route_range<E: IndexEngine>(
    registry: &TypeRegistry,
    engine: &E,
    target: IndexRef<'_>,
    field: &str,
    lo: &Value,
    hi: &Value,
) -> Result<Vec<RecordId>, QueryError> {
    let resolved = resolve_target(registry, engine, target, field)?;
    ensure_kind(&resolved, IndexKind::Numeric, &[IndexKind::Numeric])?;

    let criteria = BucketCriteria::Range {
        field: field.to_string(),
        lo: lo.clone(),
        hi: hi.clone(),
    };

    Ok(engine.query(&resolved.bucket, &criteria)?)
}

pub(crate) fn route_fulltext<E: IndexEngine>(
    registry: &TypeRegistry,
    engine: &E,
    index_name: &str,
    field: &str,
    expression: &str,
) -> Result<Vec<RecordId>, QueryError> {
    let resolved = resolve_target(registry, engine, IndexRef::named(index_name), field)?;
    ensure_kind(&resolved, IndexKind::Fulltext, &[IndexKind::Fulltext])?;

    let criteria = BucketCriteria::Fulltext {
        field: field.to_string(),
        expression: expression.to_string(),
    };

    Ok(engine.query(&resolved.bucket, &criteria)?)
}

///
/// Hits
///
/// Lazy, finite, non-restartable sequence of matching records in
/// underlying-index order. Rows resolve one at a time; records deleted
/// between routing and iteration are skipped, matching read-committed
/// visibility.
///

#[derive(Debug)]
pub struct Hits<'a, E: IndexEngine> {
    engine: &'a E,
    ids: std::vec::IntoIter<RecordId>,
}

impl<'a, E: IndexEngine> Hits<'a, E> {
    pub(crate) fn new(engine: &'a E, ids: Vec<RecordId>) -> Self {
        Self {
            engine,
            ids: ids.into_iter(),
        }
    }

    /// Collect and sort by `field`, ties broken by id, for deterministic
    /// ordering when the caller supplies an explicit criterion.
    pub fn order_by(self, field: &str) -> Result<Vec<EntityRecord>, QueryError> {
        let mut rows: Vec<EntityRecord> = self.collect::<Result<_, _>>()?;

        rows.sort_by(|a, b| {
            a.get(field)
                .canonical_cmp(b.get(field))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(rows)
    }
}

impl<E: IndexEngine> Iterator for Hits<'_, E> {
    type Item = Result<EntityRecord, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.ids.next()?;

            match self.engine.read_row(id) {
                Ok(Some(row)) => return Some(Ok(row)),
                Ok(None) => {}
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

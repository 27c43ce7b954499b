//! Module: registry
//! Responsibility: entity registration and index-descriptor resolution.
//! Does not own: index mutation planning or query dispatch.
//! Boundary: the write coordinator and query router read resolved
//! descriptors; nothing mutates a descriptor after registration.

mod validate;

use crate::{
    error::ConfigError,
    model::{
        entity::{EntityDef, simple_name},
        index::{IndexDescriptor, IndexKind, IndexLevel},
    },
    obs::{ObsEvent, record},
    value::FieldKind,
};
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

///
/// TypeRegistry
///
/// Read-mostly registry of entity runtimes. Registration is staged and
/// deterministic: structural checks first, then hierarchy materialization,
/// then hierarchy-wide invariants; state mutates only after every check
/// passes, so a failed registration leaves no trace.
///

#[derive(Default)]
pub struct TypeRegistry {
    state: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    entities: BTreeMap<String, Arc<EntityRuntime>>,

    /// Declared kind per (bucket name, field). Fulltext buckets are
    /// exclusive: they never share a name with another kind.
    bucket_kinds: BTreeMap<String, BTreeMap<String, IndexKind>>,

    /// Simple name -> first registered path, for collision warnings.
    simple_names: BTreeMap<String, String>,
}

///
/// EntityRuntime
///

pub(crate) struct EntityRuntime {
    /// Effective fields, inherited fields included.
    pub(crate) fields: BTreeMap<String, FieldKind>,

    pub(crate) descriptors: Arc<[IndexDescriptor]>,

    /// Field name -> position in `descriptors`.
    by_field: BTreeMap<String, usize>,
}

impl EntityRuntime {
    pub(crate) fn descriptor_for(&self, field: &str) -> Option<&IndexDescriptor> {
        self.by_field.get(field).map(|ix| &self.descriptors[*ix])
    }
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity definition, resolving its index descriptors.
    ///
    /// Fails with `ConfigError` on any invariant breach; a failed
    /// registration mutates nothing.
    pub fn register(&self, def: EntityDef) -> Result<(), ConfigError> {
        // Phase 1: structural checks on the definition alone.
        validate::validate_entity_path(&def.path)?;
        validate::validate_fields(&def)?;

        let mut state = self.write();

        if state.entities.contains_key(&def.path) {
            return Err(ConfigError::AlreadyRegistered {
                path: def.path.clone(),
            });
        }

        // Phase 2: materialize the hierarchy into effective fields.
        // Ancestors first, so child fields override same-named parent fields.
        let effective = materialize_fields(&state, &def)?;

        // Phase 3: resolve descriptors and enforce hierarchy-wide invariants.
        let descriptors = resolve_descriptors(&def, &effective)?;
        validate::validate_descriptor_count(&def.path, descriptors.len())?;
        enforce_single_unique(&def.path, &descriptors)?;

        let staged_kinds = stage_bucket_kinds(&state, &descriptors)?;

        // Phase 4: all checks passed; commit to registry state.
        let runtime = build_runtime(&effective, descriptors);
        for ((bucket, field), kind) in staged_kinds {
            state
                .bucket_kinds
                .entry(bucket)
                .or_default()
                .insert(field, kind);
        }

        warn_on_simple_name_collision(&mut state, &def.path);
        state.entities.insert(def.path.clone(), Arc::new(runtime));

        Ok(())
    }

    /// Resolve the index descriptor governing `(entity_path, field)`.
    #[must_use]
    pub fn resolve(&self, entity_path: &str, field: &str) -> Option<IndexDescriptor> {
        self.read()
            .entities
            .get(entity_path)
            .and_then(|runtime| runtime.descriptor_for(field).cloned())
    }

    /// All descriptors materialized for `entity_path`.
    #[must_use]
    pub fn descriptors_for(&self, entity_path: &str) -> Option<Arc<[IndexDescriptor]>> {
        self.read()
            .entities
            .get(entity_path)
            .map(|runtime| runtime.descriptors.clone())
    }

    /// Declared kind of an effective field, inherited fields included.
    #[must_use]
    pub fn field_kind(&self, entity_path: &str, field: &str) -> Option<FieldKind> {
        self.read()
            .entities
            .get(entity_path)
            .and_then(|runtime| runtime.fields.get(field).copied())
    }

    #[must_use]
    pub fn is_registered(&self, entity_path: &str) -> bool {
        self.read().entities.contains_key(entity_path)
    }

    /// Declared kind for a `(bucket, field)` slot, if any registration
    /// claimed it.
    #[must_use]
    pub fn bucket_field_kind(&self, bucket: &str, field: &str) -> Option<IndexKind> {
        self.read()
            .bucket_kinds
            .get(bucket)
            .and_then(|fields| fields.get(field).copied())
    }

    /// Whether any registration declared the bucket name, regardless of field.
    #[must_use]
    pub fn bucket_known(&self, bucket: &str) -> bool {
        self.read().bucket_kinds.contains_key(bucket)
    }

    /// Whether the named bucket was declared fulltext. Fulltext buckets are
    /// exclusive, so one fulltext slot marks the whole bucket.
    #[must_use]
    pub fn bucket_declared_fulltext(&self, bucket: &str) -> bool {
        self.read()
            .bucket_kinds
            .get(bucket)
            .is_some_and(|fields| fields.values().any(|kind| *kind == IndexKind::Fulltext))
    }

    pub(crate) fn runtime(&self, entity_path: &str) -> Option<Arc<EntityRuntime>> {
        self.read().entities.get(entity_path).cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state
            .read()
            .expect("registry RwLock poisoned while acquiring read lock")
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state
            .write()
            .expect("registry RwLock poisoned while acquiring write lock")
    }
}

/// An effective field after inheritance: the definition plus the path of
/// the entity that declared it.
struct EffectiveField {
    name: String,
    kind: FieldKind,
    index: Option<crate::model::entity::IndexSpec>,
    declared_by: String,
}

fn materialize_fields(
    state: &RegistryState,
    def: &EntityDef,
) -> Result<Vec<EffectiveField>, ConfigError> {
    let mut effective: Vec<EffectiveField> = Vec::new();

    if let Some(parent) = &def.parent {
        let parent_runtime =
            state
                .entities
                .get(parent)
                .ok_or_else(|| ConfigError::UnknownParent {
                    child: def.path.clone(),
                    parent: parent.clone(),
                })?;

        // The parent's descriptors carry their declaring path, so deep
        // hierarchies flatten one registration at a time.
        for descriptor in parent_runtime.descriptors.iter() {
            let kind = parent_runtime
                .fields
                .get(&descriptor.field)
                .copied()
                .unwrap_or(FieldKind::Text);

            effective.push(EffectiveField {
                name: descriptor.field.clone(),
                kind,
                index: Some(crate::model::entity::IndexSpec {
                    name: inherited_spec_name(descriptor),
                    kind: Some(descriptor.kind),
                    unique: descriptor.unique,
                    level: descriptor.level,
                }),
                declared_by: descriptor.declared_by.clone(),
            });
        }

        // Unindexed parent fields are still part of the child's shape.
        for (name, kind) in &parent_runtime.fields {
            if !effective.iter().any(|f| &f.name == name) {
                effective.push(EffectiveField {
                    name: name.clone(),
                    kind: *kind,
                    index: None,
                    declared_by: parent.clone(),
                });
            }
        }
    }

    for field in &def.fields {
        // Child fields override same-named inherited fields.
        effective.retain(|f| f.name != field.name);
        effective.push(EffectiveField {
            name: field.name.clone(),
            kind: field.kind,
            index: field.index.clone(),
            declared_by: def.path.clone(),
        });
    }

    Ok(effective)
}

// Class-level inherited descriptors keep the parent's resolved bucket name;
// instance-level descriptors re-resolve against the child, so an inferred
// name must not be pinned here.
fn inherited_spec_name(descriptor: &IndexDescriptor) -> Option<String> {
    let inferred = simple_name(match descriptor.level {
        IndexLevel::Class => &descriptor.declared_by,
        IndexLevel::Instance => &descriptor.entity_path,
    });

    if descriptor.index_name == inferred {
        None
    } else {
        Some(descriptor.index_name.clone())
    }
}

fn resolve_descriptors(
    def: &EntityDef,
    effective: &[EffectiveField],
) -> Result<Vec<IndexDescriptor>, ConfigError> {
    let mut descriptors = Vec::new();

    for field in effective {
        let Some(spec) = &field.index else {
            continue;
        };

        let kind = spec.kind.unwrap_or(if field.kind.is_numeric() {
            IndexKind::Numeric
        } else {
            IndexKind::Exact
        });

        // Fulltext never rides an inferred name; it owns its bucket.
        if kind == IndexKind::Fulltext && spec.name.is_none() {
            return Err(ConfigError::FulltextNameRequired {
                entity: def.path.clone(),
                field: field.name.clone(),
            });
        }

        let index_name = spec.name.clone().unwrap_or_else(|| {
            simple_name(match spec.level {
                IndexLevel::Class => &field.declared_by,
                IndexLevel::Instance => &def.path,
            })
            .to_string()
        });

        validate::validate_index_name_len(&index_name)?;

        descriptors.push(IndexDescriptor {
            entity_path: def.path.clone(),
            declared_by: field.declared_by.clone(),
            field: field.name.clone(),
            index_name,
            kind,
            unique: spec.unique,
            level: spec.level,
        });
    }

    Ok(descriptors)
}

fn enforce_single_unique(
    entity: &str,
    descriptors: &[IndexDescriptor],
) -> Result<(), ConfigError> {
    let mut unique_fields = descriptors.iter().filter(|d| d.unique);

    if let Some(first) = unique_fields.next()
        && let Some(second) = unique_fields.next()
    {
        return Err(ConfigError::MultipleUniqueFields {
            entity: entity.to_string(),
            first: first.field.clone(),
            second: second.field.clone(),
        });
    }

    Ok(())
}

type StagedKinds = Vec<((String, String), IndexKind)>;

// Check every descriptor against already-declared bucket slots without
// mutating state; the caller commits the staged result after all checks.
fn stage_bucket_kinds(
    state: &RegistryState,
    descriptors: &[IndexDescriptor],
) -> Result<StagedKinds, ConfigError> {
    let mut staged: StagedKinds = Vec::new();

    for descriptor in descriptors {
        let name = &descriptor.index_name;
        let declared_fields = state.bucket_kinds.get(name);

        // Fulltext exclusivity cuts both ways.
        if let Some(fields) = declared_fields {
            let bucket_is_fulltext = fields.values().any(|k| *k == IndexKind::Fulltext);

            if bucket_is_fulltext != (descriptor.kind == IndexKind::Fulltext) {
                let declared = if bucket_is_fulltext {
                    IndexKind::Fulltext
                } else {
                    *fields.values().next().unwrap_or(&IndexKind::Exact)
                };

                return Err(ConfigError::FulltextBucketShared {
                    name: name.clone(),
                    declared,
                });
            }

            if let Some(existing) = fields.get(&descriptor.field)
                && *existing != descriptor.kind
            {
                return Err(ConfigError::BucketKindConflict {
                    name: name.clone(),
                    declared: *existing,
                    requested: descriptor.kind,
                });
            }
        }

        // Conflicts inside one registration batch.
        for ((staged_name, staged_field), staged_kind) in &staged {
            if staged_name == name {
                let staged_is_fulltext = *staged_kind == IndexKind::Fulltext;

                if staged_is_fulltext != (descriptor.kind == IndexKind::Fulltext) {
                    return Err(ConfigError::FulltextBucketShared {
                        name: name.clone(),
                        declared: *staged_kind,
                    });
                }
                if staged_field == &descriptor.field && *staged_kind != descriptor.kind {
                    return Err(ConfigError::BucketKindConflict {
                        name: name.clone(),
                        declared: *staged_kind,
                        requested: descriptor.kind,
                    });
                }
            }
        }

        staged.push((
            (name.clone(), descriptor.field.clone()),
            descriptor.kind,
        ));
    }

    Ok(staged)
}

fn warn_on_simple_name_collision(state: &mut RegistryState, path: &str) {
    let simple = simple_name(path).to_string();

    match state.simple_names.get(&simple) {
        Some(first) if first != path => {
            record(&ObsEvent::NamingCollision {
                simple_name: simple,
                first: first.clone(),
                second: path.to_string(),
            });
        }
        Some(_) => {}
        None => {
            state.simple_names.insert(simple, path.to_string());
        }
    }
}

fn build_runtime(effective: &[EffectiveField], descriptors: Vec<IndexDescriptor>) -> EntityRuntime {
    let fields = effective
        .iter()
        .map(|f| (f.name.clone(), f.kind))
        .collect();

    let by_field = descriptors
        .iter()
        .enumerate()
        .map(|(ix, d)| (d.field.clone(), ix))
        .collect();

    EntityRuntime {
        fields,
        descriptors: descriptors.into(),
        by_field,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::IndexSpec;
    use std::{cell::RefCell, rc::Rc};

    fn person() -> EntityDef {
        EntityDef::new("app::Person")
            .indexed_field("name", FieldKind::Text, IndexSpec::unique())
            .indexed_field("age", FieldKind::Int, IndexSpec::indexed())
    }

    #[test]
    fn inferred_index_name_is_simple_type_name() {
        let registry = TypeRegistry::new();
        registry.register(person()).expect("register person");

        let descriptor = registry
            .resolve("app::Person", "name")
            .expect("resolve name descriptor");

        assert_eq!(descriptor.index_name, "Person");
        assert!(descriptor.unique);
        assert_eq!(descriptor.kind, IndexKind::Exact);
    }

    #[test]
    fn numeric_fields_default_to_numeric_kind() {
        let registry = TypeRegistry::new();
        registry.register(person()).expect("register person");

        let descriptor = registry
            .resolve("app::Person", "age")
            .expect("resolve age descriptor");

        assert_eq!(descriptor.kind, IndexKind::Numeric);
        assert_eq!(descriptor.index_name, "Person");
    }

    #[test]
    fn two_unique_fields_fail_registration() {
        let registry = TypeRegistry::new();
        let def = EntityDef::new("app::Account")
            .indexed_field("email", FieldKind::Text, IndexSpec::unique())
            .indexed_field("handle", FieldKind::Text, IndexSpec::unique());

        assert!(matches!(
            registry.register(def),
            Err(ConfigError::MultipleUniqueFields { .. })
        ));
        assert!(!registry.is_registered("app::Account"));
    }

    #[test]
    fn inherited_unique_field_counts_toward_the_hierarchy() {
        let registry = TypeRegistry::new();
        registry
            .register(
                EntityDef::new("app::Party")
                    .indexed_field("legal_id", FieldKind::Text, IndexSpec::unique()),
            )
            .expect("register parent");

        let child = EntityDef::new("app::Company")
            .extends("app::Party")
            .indexed_field("vat", FieldKind::Text, IndexSpec::unique());

        assert!(matches!(
            registry.register(child),
            Err(ConfigError::MultipleUniqueFields { .. })
        ));
    }

    #[test]
    fn fulltext_without_explicit_name_is_rejected() {
        let registry = TypeRegistry::new();
        let def = EntityDef::new("app::Person").indexed_field(
            "name",
            FieldKind::Text,
            IndexSpec {
                kind: Some(IndexKind::Fulltext),
                ..IndexSpec::default()
            },
        );

        assert!(matches!(
            registry.register(def),
            Err(ConfigError::FulltextNameRequired { .. })
        ));
    }

    #[test]
    fn fulltext_bucket_never_shares_an_exact_name() {
        let registry = TypeRegistry::new();
        registry.register(person()).expect("register person");

        // "Person" is already an exact/numeric bucket.
        let def = EntityDef::new("app::Profile").indexed_field(
            "bio",
            FieldKind::Text,
            IndexSpec::fulltext("Person"),
        );

        assert!(matches!(
            registry.register(def),
            Err(ConfigError::FulltextBucketShared { .. })
        ));
    }

    #[test]
    fn class_level_inheritance_shares_the_parent_bucket() {
        let registry = TypeRegistry::new();
        registry
            .register(
                EntityDef::new("app::Party")
                    .indexed_field("name", FieldKind::Text, IndexSpec::indexed()),
            )
            .expect("register parent");
        registry
            .register(EntityDef::new("app::Company").extends("app::Party"))
            .expect("register child");

        let descriptor = registry
            .resolve("app::Company", "name")
            .expect("resolve inherited descriptor");

        assert_eq!(descriptor.index_name, "Party");
        assert_eq!(descriptor.declared_by, "app::Party");
    }

    #[test]
    fn instance_level_inheritance_gets_its_own_bucket() {
        let registry = TypeRegistry::new();
        registry
            .register(EntityDef::new("app::Party").indexed_field(
                "name",
                FieldKind::Text,
                IndexSpec::indexed().level(IndexLevel::Instance),
            ))
            .expect("register parent");
        registry
            .register(EntityDef::new("app::Company").extends("app::Party"))
            .expect("register child");

        let parent = registry
            .resolve("app::Party", "name")
            .expect("resolve parent descriptor");
        let child = registry
            .resolve("app::Company", "name")
            .expect("resolve child descriptor");

        assert_eq!(parent.index_name, "Party");
        assert_eq!(child.index_name, "Company");
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let registry = TypeRegistry::new();
        let def = EntityDef::new("app::Company").extends("app::Party");

        assert!(matches!(
            registry.register(def),
            Err(ConfigError::UnknownParent { .. })
        ));
    }

    #[test]
    fn simple_name_collision_is_warned_not_merged() {
        use crate::obs::{ObsSink, with_sink};

        struct CaptureSink(RefCell<Vec<ObsEvent>>);

        impl ObsSink for CaptureSink {
            fn record(&self, event: &ObsEvent) {
                self.0.borrow_mut().push(event.clone());
            }
        }

        let registry = TypeRegistry::new();
        let capture = Rc::new(CaptureSink(RefCell::new(Vec::new())));

        with_sink(capture.clone(), || {
            registry
                .register(
                    EntityDef::new("app::Person")
                        .indexed_field("name", FieldKind::Text, IndexSpec::indexed()),
                )
                .expect("register first");
            registry
                .register(
                    EntityDef::new("crm::Person")
                        .indexed_field("name", FieldKind::Text, IndexSpec::indexed()),
                )
                .expect("register second despite collision");
        });

        let events = capture.0.borrow();
        assert!(events.iter().any(|event| matches!(
            event,
            ObsEvent::NamingCollision { simple_name, .. } if simple_name == "Person"
        )));
        assert!(registry.is_registered("crm::Person"));
    }
}

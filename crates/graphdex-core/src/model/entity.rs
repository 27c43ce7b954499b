//! Registration inputs.
//!
//! Annotation-driven field discovery abstracts to these explicit
//! configuration structs built at registration time; no runtime reflection.

use crate::{
    model::index::{IndexKind, IndexLevel},
    value::FieldKind,
};
use serde::{Deserialize, Serialize};

///
/// IndexSpec
/// Per-field index request. Kind and name are optional; the registry
/// resolves defaults (see `registry`).
///

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Explicit bucket name. Required for fulltext indexes.
    pub name: Option<String>,

    /// Explicit kind. Defaults to Numeric for numeric fields, else Exact.
    pub kind: Option<IndexKind>,

    pub unique: bool,
    pub level: IndexLevel,
}

impl IndexSpec {
    /// An indexed field with all defaults.
    #[must_use]
    pub fn indexed() -> Self {
        Self::default()
    }

    /// An indexed field enforcing at-most-one-owner-per-value semantics.
    #[must_use]
    pub fn unique() -> Self {
        Self {
            unique: true,
            ..Self::default()
        }
    }

    /// A fulltext index over its own named bucket.
    #[must_use]
    pub fn fulltext(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            kind: Some(IndexKind::Fulltext),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn level(mut self, level: IndexLevel) -> Self {
        self.level = level;
        self
    }
}

///
/// FieldDef
///

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub index: Option<IndexSpec>,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            index: None,
        }
    }

    #[must_use]
    pub fn indexed(name: impl Into<String>, kind: FieldKind, spec: IndexSpec) -> Self {
        Self {
            name: name.into(),
            kind,
            index: Some(spec),
        }
    }
}

///
/// EntityDef
///

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityDef {
    /// Fully-qualified path, e.g. `app::Person`. The simple name (the last
    /// `::` segment) seeds inferred bucket names.
    pub path: String,

    /// Optional parent entity; inherited indexed fields are materialized
    /// into this entity's descriptor set honoring each field's level.
    pub parent: Option<String>,

    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            parent: None,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef::new(name, kind));
        self
    }

    #[must_use]
    pub fn indexed_field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        spec: IndexSpec,
    ) -> Self {
        self.fields.push(FieldDef::indexed(name, kind, spec));
        self
    }

    /// The path segment after the last `::`, or the whole path.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        simple_name(&self.path)
    }
}

/// The simple type name of an entity path.
#[must_use]
pub fn simple_name(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_name_takes_last_segment() {
        assert_eq!(simple_name("app::people::Person"), "Person");
        assert_eq!(simple_name("Person"), "Person");
    }

    #[test]
    fn builder_accumulates_fields() {
        let def = EntityDef::new("app::Person")
            .field("bio", FieldKind::Text)
            .indexed_field("name", FieldKind::Text, IndexSpec::unique());

        assert_eq!(def.fields.len(), 2);
        assert!(def.fields[1].index.as_ref().is_some_and(|s| s.unique));
    }
}

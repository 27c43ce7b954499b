use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// IndexKind
/// Stable classification of an index bucket. A bucket's kind is fixed at
/// first creation and never downgraded.
///

#[derive(
    Clone, Copy, Debug, Eq, PartialEq, derive_more::Display, Serialize, Deserialize,
)]
pub enum IndexKind {
    /// Equality lookups only.
    #[display("exact")]
    Exact,

    /// Equality plus inclusive range queries.
    #[display("numeric")]
    Numeric,

    /// Token and wildcard search expressions.
    #[display("fulltext")]
    Fulltext,
}

///
/// IndexLevel
/// Which type an inherited indexed field resolves its bucket against.
///

#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, derive_more::Display, Serialize, Deserialize,
)]
pub enum IndexLevel {
    /// The class that declared the field; subclasses share its bucket.
    #[default]
    #[display("class")]
    Class,

    /// The registered (most-derived) type; each subclass gets its own bucket.
    #[display("instance")]
    Instance,
}

///
/// IndexDescriptor
/// Immutable per-field index policy, derived once at registration and owned
/// by the registry. Keeps the write and query paths decoupled from the
/// registration-input shape.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Registered (most-derived) entity path this descriptor was built for.
    pub entity_path: String,

    /// Entity path that declared the field (differs under inheritance).
    pub declared_by: String,

    pub field: String,

    /// Resolved bucket name: explicit, or inferred from a simple type name.
    pub index_name: String,

    pub kind: IndexKind,
    pub unique: bool,
    pub level: IndexLevel,
}

impl Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            write!(f, "UNIQUE {}({})", self.index_name, self.field)
        } else {
            write!(f, "{}({})", self.index_name, self.field)
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_marks_unique_descriptors() {
        let descriptor = IndexDescriptor {
            entity_path: "app::Person".to_string(),
            declared_by: "app::Person".to_string(),
            field: "name".to_string(),
            index_name: "Person".to_string(),
            kind: IndexKind::Exact,
            unique: true,
            level: IndexLevel::Class,
        };

        assert_eq!(descriptor.to_string(), "UNIQUE Person(name)");
    }
}

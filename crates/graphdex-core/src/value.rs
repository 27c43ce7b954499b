//! Property value model.
//!
//! Values are deliberately small: text, signed integer, float, and null.
//! Null is the "cleared" state — a null field owns no index entry.

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{self, Display},
};

///
/// CONSTANTS
///

/// Largest integer magnitude a float comparison can represent exactly.
const F64_SAFE_I64: i64 = 1i64 << 53;

///
/// FieldKind
///
/// Declared storage kind of an entity field. Fields are homogeneous: a
/// field declared Int never holds Text, and index buckets inherit the
/// homogeneity.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display, Serialize, Deserialize)]
pub enum FieldKind {
    #[display("text")]
    Text,
    #[display("int")]
    Int,
    #[display("float")]
    Float,
}

impl FieldKind {
    /// Whether values of this kind support inclusive range queries.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

///
/// Value
///

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The field kind this value belongs to, or `None` for null.
    #[must_use]
    pub const fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Null => None,
            Self::Text(_) => Some(FieldKind::Text),
            Self::Int(_) => Some(FieldKind::Int),
            Self::Float(_) => Some(FieldKind::Float),
        }
    }

    /// Whether this value may be stored in a field of `kind`.
    /// Null is admissible everywhere; it clears the field.
    #[must_use]
    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        self.kind().is_none_or(|own| own == kind)
    }

    /// Whether this value can participate in an index key.
    /// Null never indexes; NaN floats are rejected rather than skipped so
    /// unique guards cannot alias through NaN.
    #[must_use]
    pub const fn is_indexable(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Float(f) => !f.is_nan(),
            Self::Text(_) | Self::Int(_) => true,
        }
    }

    /// Total ordering used for explicit sort criteria.
    ///
    /// Null sorts first, then text lexicographically, then numerics by
    /// numeric value (Int and Float compare cross-kind; integers beyond
    /// the exact f64 window fall back to sign ordering).
    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,

            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), _) => Ordering::Less,
            (_, Self::Text(_)) => Ordering::Greater,

            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Int(a), Self::Float(b)) => cmp_int_float(*a, *b),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(*b, *a).reverse(),
        }
    }
}

// Int/Float cross-kind comparison stays exact inside the f64-safe window.
#[expect(clippy::cast_precision_loss)]
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    if int.abs() < F64_SAFE_I64 {
        (int as f64).total_cmp(&float)
    } else if int.is_negative() {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

///
/// TESTS
///

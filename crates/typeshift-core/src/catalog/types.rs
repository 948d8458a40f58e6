//! Core type definitions for the catalog.

use rkyv::Archive;
use serde::{Deserialize, Serialize};

/// Built-in scalar types every snapshot knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarType {
    /// UTF-8 string.
    Str,
    /// Boolean value.
    Bool,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// Arbitrary precision decimal.
    Decimal,
    /// Arbitrary precision integer.
    BigInt,
    /// UUID (128-bit identifier).
    Uuid,
    /// Timezone-aware point in time.
    DateTime,
    /// Time interval.
    Duration,
    /// JSON document.
    Json,
    /// Binary data.
    Bytes,
}

impl ScalarType {
    /// All built-in scalars, in declaration order.
    pub const ALL: [ScalarType; 14] = [
        ScalarType::Str,
        ScalarType::Bool,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::Float32,
        ScalarType::Float64,
        ScalarType::Decimal,
        ScalarType::BigInt,
        ScalarType::Uuid,
        ScalarType::DateTime,
        ScalarType::Duration,
        ScalarType::Json,
        ScalarType::Bytes,
    ];

    /// Canonical (unqualified) name of the scalar.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Str => "str",
            ScalarType::Bool => "bool",
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
            ScalarType::Decimal => "decimal",
            ScalarType::BigInt => "bigint",
            ScalarType::Uuid => "uuid",
            ScalarType::DateTime => "datetime",
            ScalarType::Duration => "duration",
            ScalarType::Json => "json",
            ScalarType::Bytes => "bytes",
        }
    }

    /// Look up a built-in scalar by name, with or without the `std::` prefix.
    pub fn parse(name: &str) -> Option<Self> {
        let bare = name.strip_prefix("std::").unwrap_or(name);
        Self::ALL.iter().copied().find(|s| s.name() == bare)
    }

    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int16
                | ScalarType::Int32
                | ScalarType::Int64
                | ScalarType::Float32
                | ScalarType::Float64
                | ScalarType::Decimal
                | ScalarType::BigInt
        )
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a declared type is an object type or a scalar type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Object type with properties and links.
    #[default]
    Object,
    /// Scalar type derived from a built-in scalar.
    Scalar,
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeKind::Object => write!(f, "object"),
            TypeKind::Scalar => write!(f, "scalar"),
        }
    }
}

/// Whether a pointer is a property (scalar-valued) or a link (object-valued).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    /// Points at a scalar type.
    #[default]
    Property,
    /// Points at an object type.
    Link,
}

impl PointerKind {
    /// DDL keyword for this pointer kind.
    pub fn keyword(&self) -> &'static str {
        match self {
            PointerKind::Property => "PROPERTY",
            PointerKind::Link => "LINK",
        }
    }
}

impl std::fmt::Display for PointerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointerKind::Property => write!(f, "property"),
            PointerKind::Link => write!(f, "link"),
        }
    }
}

/// How many values a pointer holds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At most one value.
    #[default]
    Single,
    /// Any number of values.
    Multi,
}

impl Cardinality {
    /// Check whether going from `self` to `to` can lose data.
    pub fn is_narrowing(&self, to: Cardinality) -> bool {
        *self == Cardinality::Multi && to == Cardinality::Single
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cardinality::Single => write!(f, "single"),
            Cardinality::Multi => write!(f, "multi"),
        }
    }
}

/// Strip the `std::` prefix from built-in scalar names so references compare equal.
pub fn canonical_type_name(name: &str) -> String {
    match ScalarType::parse(name) {
        Some(scalar) => scalar.name().to_string(),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_parse() {
        assert_eq!(ScalarType::parse("str"), Some(ScalarType::Str));
        assert_eq!(ScalarType::parse("std::int64"), Some(ScalarType::Int64));
        assert_eq!(ScalarType::parse("Person"), None);
        assert_eq!(ScalarType::parse("std::Person"), None);
    }

    #[test]
    fn test_scalar_type_checks() {
        assert!(ScalarType::Int32.is_numeric());
        assert!(ScalarType::Decimal.is_numeric());
        assert!(!ScalarType::Str.is_numeric());
        assert!(!ScalarType::Uuid.is_numeric());
    }

    #[test]
    fn test_cardinality_narrowing() {
        assert!(Cardinality::Multi.is_narrowing(Cardinality::Single));
        assert!(!Cardinality::Single.is_narrowing(Cardinality::Multi));
        assert!(!Cardinality::Multi.is_narrowing(Cardinality::Multi));
    }

    #[test]
    fn test_canonical_type_name() {
        assert_eq!(canonical_type_name("std::str"), "str");
        assert_eq!(canonical_type_name("Person"), "Person");
    }

    #[test]
    fn test_kind_serde() {
        let kind: PointerKind = serde_json::from_str("\"link\"").unwrap();
        assert_eq!(kind, PointerKind::Link);
        assert_eq!(serde_json::to_string(&Cardinality::Multi).unwrap(), "\"multi\"");
    }
}

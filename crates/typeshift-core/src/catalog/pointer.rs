//! Pointer (property and link) definitions.

use super::types::{Cardinality, PointerKind};
use rkyv::Archive;
use serde::{Deserialize, Serialize};

/// A property or link declared on a type.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct PointerDef {
    /// Pointer name (unique within the declaring type).
    pub name: String,
    /// Property or link.
    #[serde(default)]
    pub kind: PointerKind,
    /// Target type name (scalar for properties, object type for links).
    pub target: String,
    /// Single or multi.
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Whether every instance must hold a value.
    #[serde(default)]
    pub required: bool,
    /// Default-value expression, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Whether values must be unique across instances.
    #[serde(default)]
    pub exclusive: bool,
}

impl PointerDef {
    /// Create an optional single property.
    pub fn property(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PointerKind::Property,
            target: target.into(),
            cardinality: Cardinality::Single,
            required: false,
            default: None,
            exclusive: false,
        }
    }

    /// Create an optional single link.
    pub fn link(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: PointerKind::Link,
            ..Self::property(name, target)
        }
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark as multi.
    pub fn multi(mut self) -> Self {
        self.cardinality = Cardinality::Multi;
        self
    }

    /// Set the default expression.
    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Mark as exclusive.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Check if this is a link.
    pub fn is_link(&self) -> bool {
        self.kind == PointerKind::Link
    }

    /// Check whether two declarations agree on everything but the name.
    pub fn same_shape(&self, other: &PointerDef) -> bool {
        self.kind == other.kind
            && self.target == other.target
            && self.cardinality == other.cardinality
            && self.required == other.required
            && self.default == other.default
            && self.exclusive == other.exclusive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_builder() {
        let ptr = PointerDef::property("name", "str")
            .required()
            .with_default("'unknown'")
            .exclusive();

        assert_eq!(ptr.name, "name");
        assert!(ptr.required);
        assert!(ptr.exclusive);
        assert_eq!(ptr.default.as_deref(), Some("'unknown'"));
        assert!(!ptr.is_link());
    }

    #[test]
    fn test_link_defaults() {
        let link = PointerDef::link("friends", "Person").multi();

        assert!(link.is_link());
        assert_eq!(link.cardinality, Cardinality::Multi);
        assert!(!link.required);
    }

    #[test]
    fn test_same_shape_ignores_name() {
        let a = PointerDef::property("title", "str").required();
        let b = PointerDef::property("heading", "str").required();
        let c = PointerDef::property("heading", "str");

        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }

    #[test]
    fn test_json_defaults() {
        let ptr: PointerDef =
            serde_json::from_str(r#"{"name": "email", "target": "str"}"#).unwrap();

        assert_eq!(ptr.kind, PointerKind::Property);
        assert_eq!(ptr.cardinality, Cardinality::Single);
        assert!(!ptr.required);
        assert!(ptr.default.is_none());
    }
}

//! Type declarations.

use super::constraint::ConstraintDef;
use super::pointer::PointerDef;
use super::types::TypeKind;
use rkyv::Archive;
use serde::{Deserialize, Serialize};

/// A declared object or scalar type, as written in the schema source.
///
/// Only declared members live here. Inherited pointers and constraints are
/// resolved by [`SchemaSnapshot`](super::SchemaSnapshot) when the snapshot is
/// built.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct TypeDef {
    /// Type name.
    pub name: String,
    /// Object or scalar.
    #[serde(default)]
    pub kind: TypeKind,
    /// Abstract types cannot have instances of their own.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Direct bases, in declaration order.
    #[serde(default)]
    pub bases: Vec<String>,
    /// Declared pointers.
    #[serde(default)]
    pub pointers: Vec<PointerDef>,
    /// Declared composite constraints.
    #[serde(default)]
    pub constraints: Vec<ConstraintDef>,
}

impl TypeDef {
    /// Create a concrete object type with no bases.
    pub fn object(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Object,
            is_abstract: false,
            bases: Vec::new(),
            pointers: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Create a scalar type extending `base`.
    pub fn scalar(name: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Scalar,
            bases: vec![base.into()],
            ..Self::object(name)
        }
    }

    /// Mark as abstract.
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Append a direct base.
    pub fn extending(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    /// Declare a pointer.
    pub fn with_pointer(mut self, pointer: PointerDef) -> Self {
        self.pointers.push(pointer);
        self
    }

    /// Declare a composite constraint.
    pub fn with_constraint(mut self, constraint: ConstraintDef) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Get a declared pointer by name.
    pub fn get_pointer(&self, name: &str) -> Option<&PointerDef> {
        self.pointers.iter().find(|p| p.name == name)
    }

    /// Get a mutable declared pointer by name.
    pub fn get_pointer_mut(&mut self, name: &str) -> Option<&mut PointerDef> {
        self.pointers.iter_mut().find(|p| p.name == name)
    }

    /// Check whether the type declares `name` itself.
    pub fn declares(&self, name: &str) -> bool {
        self.get_pointer(name).is_some()
    }

    /// Check if this is a scalar type.
    pub fn is_scalar(&self) -> bool {
        self.kind == TypeKind::Scalar
    }

    /// Names of all types this declaration refers to (bases and pointer targets).
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.bases
            .iter()
            .map(String::as_str)
            .chain(self.pointers.iter().map(|p| p.target.as_str()))
    }

    /// Sort pointers and constraints into canonical order.
    pub(crate) fn canonicalize(&mut self) {
        self.pointers.sort_by(|a, b| a.name.cmp(&b.name));
        self.constraints.sort();
    }
}

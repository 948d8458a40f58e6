//! Exclusivity constraint definitions.

use rkyv::Archive;
use serde::{Deserialize, Serialize};

/// An exclusivity constraint over one or more pointers of a type.
///
/// The combined values of `on` must be unique across all instances of the
/// declaring type and its subtypes. Two constraints are the same constraint
/// when they cover the same pointers in the same order.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct ConstraintDef {
    /// Pointers covered by the constraint.
    pub on: Vec<String>,
}

impl ConstraintDef {
    /// Create an exclusive constraint over the given pointers.
    pub fn exclusive(on: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            on: on.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if this constraint spans more than one pointer.
    pub fn is_composite(&self) -> bool {
        self.on.len() > 1
    }

    /// Check if this constraint covers the given pointer.
    pub fn covers(&self, pointer: &str) -> bool {
        self.on.iter().any(|p| p == pointer)
    }

    /// Stable textual identity, e.g. `exclusive(first, last)`.
    pub fn signature(&self) -> String {
        format!("exclusive({})", self.on.join(", "))
    }

    /// The DDL subject expression, e.g. `((.first, .last))`.
    pub fn subject_expr(&self) -> String {
        let paths: Vec<String> = self.on.iter().map(|p| format!(".{}", p)).collect();
        if paths.len() == 1 {
            format!("({})", paths[0])
        } else {
            format!("(({}))", paths.join(", "))
        }
    }

    /// Return a copy with pointer names rewritten through `rename`.
    pub fn renamed(&self, rename: impl Fn(&str) -> String) -> Self {
        Self {
            on: self.on.iter().map(|p| rename(p)).collect(),
        }
    }
}

impl std::fmt::Display for ConstraintDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.signature())
    }
}

//! Atomic schema operations.

use crate::catalog::{Cardinality, ConstraintDef, PointerDef, PointerKind, TypeDef, TypeKind};
use serde::{Deserialize, Serialize};

/// A pointer addressed by its type. Names are those in effect when the
/// operation runs, so renames earlier in the plan are already reflected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointerPath {
    /// Type the operation is scoped to.
    pub type_name: String,
    /// Pointer name.
    pub name: String,
    /// Property or link.
    pub kind: PointerKind,
}

impl PointerPath {
    /// Create a path.
    pub fn new(type_name: impl Into<String>, name: impl Into<String>, kind: PointerKind) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            kind,
        }
    }
}

impl std::fmt::Display for PointerPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.type_name, self.name)
    }
}

/// One atomic schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a type with its declared members.
    CreateType {
        /// The new declaration.
        def: TypeDef,
    },
    /// Drop a type with its declared members.
    DropType {
        /// The dropped declaration.
        def: TypeDef,
    },
    /// Rename a type; references follow.
    RenameType {
        /// Object or scalar.
        kind: TypeKind,
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },
    /// Replace the direct bases of a type.
    AlterBase {
        /// The type.
        type_name: String,
        /// Object or scalar.
        kind: TypeKind,
        /// Previous bases.
        from: Vec<String>,
        /// New bases.
        to: Vec<String>,
    },
    /// Set or clear the abstract flag.
    AlterAbstract {
        /// The type.
        type_name: String,
        /// New value.
        to: bool,
    },
    /// Declare a property or link.
    AddProperty {
        /// The declaring type.
        type_name: String,
        /// The declaration.
        pointer: PointerDef,
    },
    /// Remove a declared property or link.
    DropProperty {
        /// The declaring type.
        type_name: String,
        /// The removed declaration.
        pointer: PointerDef,
    },
    /// Rename a declared pointer; overrides and constraints follow.
    RenameProperty {
        /// The pointer under its old name.
        path: PointerPath,
        /// New name.
        to: String,
    },
    /// Change cardinality.
    AlterCardinality {
        /// The pointer.
        path: PointerPath,
        /// Previous cardinality.
        from: Cardinality,
        /// New cardinality.
        to: Cardinality,
    },
    /// Change the default expression.
    AlterDefault {
        /// The pointer.
        path: PointerPath,
        /// Previous default.
        from: Option<String>,
        /// New default.
        to: Option<String>,
    },
    /// Make a pointer required or optional.
    AlterRequired {
        /// The pointer.
        path: PointerPath,
        /// New value.
        to: bool,
        /// Whether a default is in effect afterwards.
        has_default: bool,
    },
    /// Change the target type.
    AlterTarget {
        /// The pointer.
        path: PointerPath,
        /// Previous target.
        from: String,
        /// New target.
        to: String,
    },
    /// Turn the per-pointer exclusive constraint on or off.
    AlterExclusive {
        /// The pointer.
        path: PointerPath,
        /// New value.
        to: bool,
    },
    /// Add a composite exclusive constraint.
    AddConstraint {
        /// The declaring type.
        type_name: String,
        /// The constraint.
        constraint: ConstraintDef,
    },
    /// Drop a composite exclusive constraint.
    DropConstraint {
        /// The declaring type.
        type_name: String,
        /// The constraint.
        constraint: ConstraintDef,
    },
}

/// Discriminant of [`Operation`], ordered by phase priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    RenameType,
    RenameProperty,
    CreateType,
    AlterBase,
    AlterAbstract,
    AddProperty,
    AlterTarget,
    AlterCardinality,
    AlterRequired,
    AlterDefault,
    AlterExclusive,
    AddConstraint,
    DropConstraint,
    DropProperty,
    DropType,
}

impl OperationKind {
    /// Tie-break priority used when several operations are ready at once.
    pub fn priority(&self) -> u8 {
        *self as u8
    }
}

impl Operation {
    /// The discriminant.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateType { .. } => OperationKind::CreateType,
            Operation::DropType { .. } => OperationKind::DropType,
            Operation::RenameType { .. } => OperationKind::RenameType,
            Operation::AlterBase { .. } => OperationKind::AlterBase,
            Operation::AlterAbstract { .. } => OperationKind::AlterAbstract,
            Operation::AddProperty { .. } => OperationKind::AddProperty,
            Operation::DropProperty { .. } => OperationKind::DropProperty,
            Operation::RenameProperty { .. } => OperationKind::RenameProperty,
            Operation::AlterCardinality { .. } => OperationKind::AlterCardinality,
            Operation::AlterDefault { .. } => OperationKind::AlterDefault,
            Operation::AlterRequired { .. } => OperationKind::AlterRequired,
            Operation::AlterTarget { .. } => OperationKind::AlterTarget,
            Operation::AlterExclusive { .. } => OperationKind::AlterExclusive,
            Operation::AddConstraint { .. } => OperationKind::AddConstraint,
            Operation::DropConstraint { .. } => OperationKind::DropConstraint,
        }
    }

    /// The type this operation is scoped to (the new name for renames).
    pub fn type_name(&self) -> &str {
        match self {
            Operation::CreateType { def } | Operation::DropType { def } => &def.name,
            Operation::RenameType { to, .. } => to,
            Operation::AlterBase { type_name, .. }
            | Operation::AlterAbstract { type_name, .. }
            | Operation::AddProperty { type_name, .. }
            | Operation::DropProperty { type_name, .. }
            | Operation::AddConstraint { type_name, .. }
            | Operation::DropConstraint { type_name, .. } => type_name,
            Operation::RenameProperty { path, .. }
            | Operation::AlterCardinality { path, .. }
            | Operation::AlterDefault { path, .. }
            | Operation::AlterRequired { path, .. }
            | Operation::AlterTarget { path, .. }
            | Operation::AlterExclusive { path, .. } => &path.type_name,
        }
    }

    /// The pointer this operation touches, if any (the new name for renames).
    pub fn pointer_name(&self) -> Option<&str> {
        match self {
            Operation::AddProperty { pointer, .. } | Operation::DropProperty { pointer, .. } => {
                Some(&pointer.name)
            }
            Operation::RenameProperty { to, .. } => Some(to),
            Operation::AlterCardinality { path, .. }
            | Operation::AlterDefault { path, .. }
            | Operation::AlterRequired { path, .. }
            | Operation::AlterTarget { path, .. }
            | Operation::AlterExclusive { path, .. } => Some(&path.name),
            _ => None,
        }
    }

    /// Check if this alters attributes of an existing pointer.
    pub fn is_pointer_alter(&self) -> bool {
        matches!(
            self.kind(),
            OperationKind::AlterCardinality
                | OperationKind::AlterDefault
                | OperationKind::AlterRequired
                | OperationKind::AlterTarget
                | OperationKind::AlterExclusive
        )
    }

    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            Operation::CreateType { def } => format!("create {} type {}", def.kind, def.name),
            Operation::DropType { def } => format!("drop {} type {}", def.kind, def.name),
            Operation::RenameType { from, to, .. } => format!("rename type {} to {}", from, to),
            Operation::AlterBase { type_name, to, .. } if to.is_empty() => {
                format!("remove all bases of {}", type_name)
            }
            Operation::AlterBase { type_name, to, .. } => {
                format!("rebase {} onto {}", type_name, to.join(", "))
            }
            Operation::AlterAbstract { type_name, to } => {
                if *to {
                    format!("make {} abstract", type_name)
                } else {
                    format!("make {} concrete", type_name)
                }
            }
            Operation::AddProperty { type_name, pointer } => {
                format!("add {} {}.{}", pointer.kind, type_name, pointer.name)
            }
            Operation::DropProperty { type_name, pointer } => {
                format!("drop {} {}.{}", pointer.kind, type_name, pointer.name)
            }
            Operation::RenameProperty { path, to } => {
                format!("rename {} {} to {}", path.kind, path, to)
            }
            Operation::AlterCardinality { path, from, to } => {
                format!("change cardinality of {} from {} to {}", path, from, to)
            }
            Operation::AlterDefault { path, to, .. } => match to {
                Some(expr) => format!("set default of {} to {}", path, expr),
                None => format!("remove default of {}", path),
            },
            Operation::AlterRequired { path, to, .. } => {
                if *to {
                    format!("make {} required", path)
                } else {
                    format!("make {} optional", path)
                }
            }
            Operation::AlterTarget { path, from, to } => {
                format!("retarget {} from {} to {}", path, from, to)
            }
            Operation::AlterExclusive { path, to } => {
                if *to {
                    format!("make {} exclusive", path)
                } else {
                    format!("drop exclusivity of {}", path)
                }
            }
            Operation::AddConstraint {
                type_name,
                constraint,
            } => format!("add constraint {} on {}", constraint, type_name),
            Operation::DropConstraint {
                type_name,
                constraint,
            } => format!("drop constraint {} on {}", constraint, type_name),
        }
    }

    /// Canonical ordering key: priority, type, pointer, then description.
    pub(crate) fn sort_key(&self) -> (u8, String, String, String) {
        (
            self.kind().priority(),
            self.type_name().to_string(),
            self.pointer_name().unwrap_or_default().to_string(),
            self.description(),
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}

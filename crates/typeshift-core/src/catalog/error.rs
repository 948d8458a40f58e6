//! Schema validation errors.

use thiserror::Error;

/// Errors raised while validating a schema into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two declarations share a name.
    #[error("type {name} is declared more than once")]
    DuplicateType {
        /// The duplicated name.
        name: String,
    },

    /// A declaration uses the name of a built-in scalar.
    #[error("type {name} shadows a built-in scalar")]
    ReservedName {
        /// The offending name.
        name: String,
    },

    /// A type declares the same pointer twice.
    #[error("pointer {type_name}.{pointer} is declared more than once")]
    DuplicatePointer {
        /// The declaring type.
        type_name: String,
        /// The duplicated pointer.
        pointer: String,
    },

    /// A scalar type declares pointers or constraints.
    #[error("scalar type {name} cannot declare pointers or constraints")]
    ScalarWithPointers {
        /// The scalar type.
        name: String,
    },

    /// A scalar type has more than one base.
    #[error("scalar type {name} has {count} bases, at most one is allowed")]
    ScalarMultipleBases {
        /// The scalar type.
        name: String,
        /// Number of declared bases.
        count: usize,
    },

    /// A concrete scalar type has no base to draw its values from.
    #[error("concrete scalar type {name} must extend a scalar")]
    ScalarWithoutBase {
        /// The scalar type.
        name: String,
    },

    /// A reference names a type that does not exist.
    #[error("unknown type {name} referenced by {referenced_by}")]
    UnknownType {
        /// The missing type.
        name: String,
        /// Where the reference appears.
        referenced_by: String,
    },

    /// An object type extends a scalar, or the reverse.
    #[error("{kind} type {name} cannot extend {base}")]
    BaseKindMismatch {
        /// The extending type.
        name: String,
        /// Kind of the extending type.
        kind: String,
        /// The base of the wrong kind.
        base: String,
    },

    /// The inheritance graph contains a cycle.
    #[error("inheritance cycle: {}", path.join(" -> "))]
    InheritanceCycle {
        /// The types on the cycle, first repeated at the end.
        path: Vec<String>,
    },

    /// No C3 linearisation exists for the type.
    #[error("cannot linearise bases of {name}")]
    InconsistentHierarchy {
        /// The type whose bases conflict.
        name: String,
    },

    /// A property targets an object type, or a link targets a scalar.
    #[error("{kind} {type_name}.{pointer} cannot target {target}")]
    PointerTargetMismatch {
        /// The declaring type.
        type_name: String,
        /// The pointer.
        pointer: String,
        /// Pointer kind.
        kind: String,
        /// The offending target.
        target: String,
    },

    /// An override changes the kind of an inherited pointer.
    #[error("{type_name}.{pointer} overrides a {inherited} from {owner} with a {declared}")]
    IncompatibleOverride {
        /// The overriding type.
        type_name: String,
        /// The pointer.
        pointer: String,
        /// Type the inherited declaration comes from.
        owner: String,
        /// Kind of the inherited pointer.
        inherited: String,
        /// Kind of the override.
        declared: String,
    },

    /// A constraint covers a pointer the type does not have.
    #[error("constraint on {type_name} covers unknown pointer {pointer}")]
    UnknownConstraintPointer {
        /// The declaring type.
        type_name: String,
        /// The missing pointer.
        pointer: String,
    },

    /// A constraint covers no pointers or repeats one.
    #[error("constraint on {type_name} must cover distinct pointers")]
    MalformedConstraint {
        /// The declaring type.
        type_name: String,
    },
}

//! Migration-specific error types.

use crate::catalog::SchemaError;
use rkyv::Archive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Safety grade for a migration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub enum SafetyGrade {
    /// Grade A: Additive, no data touched.
    /// Examples: new types, new optional pointers, dropped constraints.
    A,
    /// Grade B: Needs data work but loses nothing.
    /// Examples: new constraints, required pointers with defaults.
    B,
    /// Grade C: Breaking but migratable.
    /// Examples: renames, rebases, narrowing, retargeting.
    C,
    /// Grade D: Destructive, requires explicit confirmation.
    /// Examples: dropped types or pointers, required without default.
    D,
}

impl SafetyGrade {
    /// Single-letter form.
    pub fn letter(&self) -> char {
        match self {
            SafetyGrade::A => 'A',
            SafetyGrade::B => 'B',
            SafetyGrade::C => 'C',
            SafetyGrade::D => 'D',
        }
    }
}

impl std::fmt::Display for SafetyGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyGrade::A => write!(f, "A (additive)"),
            SafetyGrade::B => write!(f, "B (needs data work)"),
            SafetyGrade::C => write!(f, "C (breaking, migratable)"),
            SafetyGrade::D => write!(f, "D (destructive)"),
        }
    }
}

/// Reasons the planner refuses to order or schedule a migration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    /// The operations depend on each other in a loop.
    #[error("operations form a dependency cycle: {}", operations.join("; "))]
    Cycle {
        /// Descriptions of the operations left unordered.
        operations: Vec<String>,
    },

    /// Narrowing to single cardinality without knowing the data fits.
    #[error("cannot narrow {type_name}.{pointer} to single: multiplicity of existing data is unknown")]
    UncheckedNarrowing {
        /// The type being checked.
        type_name: String,
        /// The pointer being narrowed.
        pointer: String,
    },

    /// Existing data holds more than one value where one is required.
    #[error("cannot narrow {type_name}.{pointer} to single: an instance holds {count} values")]
    IncompatibleCardinality {
        /// The type holding offending data.
        type_name: String,
        /// The pointer being narrowed.
        pointer: String,
        /// Highest observed multiplicity.
        count: u64,
    },

    /// A type with instances cannot become abstract.
    #[error("cannot make {type_name} abstract: {}", describe_instances(*instances))]
    AbstractWithInstances {
        /// The type.
        type_name: String,
        /// Known instance count, if any.
        instances: Option<u64>,
    },

    /// Existing instances would have no value for a required pointer.
    #[error("{type_name}.{pointer} becomes required without a default: {}", describe_instances(*instances))]
    MissingDefault {
        /// The type with instances.
        type_name: String,
        /// The pointer.
        pointer: String,
        /// Known instance count, if any.
        instances: Option<u64>,
    },
}

fn describe_instances(instances: Option<u64>) -> String {
    match instances {
        Some(n) => format!("{} instance(s) exist", n),
        None => "instance count is unknown".to_string(),
    }
}

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A rename could not be resolved without a hint.
    #[error("ambiguous diff for {subject}: candidates {}; pass a rename hint or change the rename policy", candidates.join(", "))]
    AmbiguousDiff {
        /// The dropped item with candidates.
        subject: String,
        /// The candidate renames.
        candidates: Vec<String>,
    },

    /// A rename hint names something that does not exist.
    #[error("invalid rename hint {hint}: {reason}")]
    InvalidHint {
        /// The hint as written.
        hint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A scalar in use by populated types cannot be rebased.
    #[error("cannot rebase scalar {type_name}: it is used by {used_by} which may have instances")]
    ImmutableBase {
        /// The scalar type.
        type_name: String,
        /// A concrete type holding values of the scalar.
        used_by: String,
    },

    /// Planner rejection.
    #[error("planning failed: {0}")]
    Planning(#[from] PlanningError),

    /// Existing data violates a constraint being introduced.
    #[error("constraint {constraint} on {type_name} is violated by {duplicates} duplicate(s)")]
    ConstraintViolation {
        /// The constrained type.
        type_name: String,
        /// The constraint signature.
        constraint: String,
        /// Number of duplicate groups reported.
        duplicates: u64,
    },

    /// Cannot perform the operation without confirmation due to safety grade.
    #[error("cannot perform {operation}: grade {grade}, requires {requirement}")]
    UnsafeOperation {
        /// The operation being attempted.
        operation: String,
        /// The safety grade of the operation.
        grade: SafetyGrade,
        /// What is required to perform this operation.
        requirement: String,
    },

    /// A snapshot failed validation.
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),

    /// An operation could not be applied to a snapshot.
    #[error("cannot apply {operation}: {reason}")]
    Apply {
        /// The operation.
        operation: String,
        /// Why it failed.
        reason: String,
    },

    /// No changes detected between schemas.
    #[error("no changes detected between schema revisions {from_revision} and {to_revision}")]
    NoChanges {
        /// Source schema revision.
        from_revision: u64,
        /// Target schema revision.
        to_revision: u64,
    },

    /// Revision store error.
    #[error("store error: {0}")]
    Store(#[from] crate::error::Error),
}

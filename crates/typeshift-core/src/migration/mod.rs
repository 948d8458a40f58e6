//! Migration engine for typeshift.
//!
//! Turns a pair of schema snapshots into an ordered, guarded migration:
//! - Structural diffing on effective (inherited) values
//! - Rename detection driven by hints
//! - Safety grading (A/B/C/D)
//! - Dependency ordering with data-compatibility guards
//! - Deterministic DDL script emission
//!
//! # Safety Grades
//!
//! | Grade | Description | Examples | Behavior |
//! |-------|-------------|----------|----------|
//! | **A** | Additive | New types, new optional pointers | Always planned |
//! | **B** | Needs data work | New constraints, required pointers with defaults | Planned, may carry guards |
//! | **C** | Breaking but migratable | Renames, rebases, narrowing | Planned, checked through the probe |
//! | **D** | Destructive | Dropped types or pointers | Requires `allow_destructive` |
//!
//! # Example
//!
//! ```ignore
//! use typeshift_core::migration::{EmptyDatabase, MigrationConfig, Migrator};
//!
//! let migrator = Migrator::new(MigrationConfig::default());
//! let prepared = migrator.prepare(&old, &new, &EmptyDatabase)?;
//!
//! println!("Migration grade: {}", prepared.plan.grade.overall_grade);
//! println!("{}", prepared.script.render());
//! ```

pub mod apply;
pub mod diff;
pub mod emit;
pub mod error;
pub mod executor;
pub mod grader;
pub mod operation;
pub mod plan;
pub mod probe;
pub mod rename;

// Diff types
pub use diff::{DiffOptions, SchemaDiff};

// Error types
pub use error::{MigrationError, PlanningError, SafetyGrade};

// Grader types
pub use grader::{ChangeGrade, MigrationGrade, SafetyGrader};

// Operation types
pub use operation::{Operation, OperationKind, PointerPath};

// Plan types
pub use plan::{migration_id, Guard, MigrationPlan, PlannedStep, Planner, PlannerConfig};

// Probe types
pub use probe::{Compatibility, DataProbe, EmptyDatabase, StaticProbe, Unprobed};

// Rename types
pub use rename::{AutoRename, RenameHints, RENAME_THRESHOLD};

// Output types
pub use apply::apply;
pub use emit::{Script, ScriptEmitter};
pub use executor::{MigrationConfig, MigrationOutcome, Migrator, PreparedMigration};

//! typeshift core - schema graph model, differ, migration planner and
//! script emitter for object/relational schemas with inheritance.
//!
//! ```ignore
//! use typeshift_core::{SchemaSource, Migrator, MigrationConfig, EmptyDatabase};
//!
//! let old = SchemaSource::from_json(&old_json)?.build()?;
//! let new = SchemaSource::from_json(&new_json)?.build()?;
//! let prepared = Migrator::new(MigrationConfig::default()).prepare(&old, &new, &EmptyDatabase)?;
//! print!("{}", prepared.script.render());
//! ```

pub mod catalog;
pub mod error;
pub mod migration;
pub mod store;

pub use catalog::{
    Cardinality, ConstraintDef, PointerDef, PointerKind, ScalarType, SchemaError, SchemaSnapshot,
    SchemaSource, TypeDef, TypeKind,
};
pub use error::Error;
pub use migration::{
    AutoRename, DataProbe, DiffOptions, EmptyDatabase, Guard, MigrationConfig, MigrationError,
    MigrationGrade, MigrationPlan, Migrator, Operation, PlannedStep, Planner, PlannerConfig,
    PlanningError, RenameHints, SafetyGrade, SafetyGrader, SchemaDiff, Script, ScriptEmitter,
    StaticProbe, Unprobed,
};
pub use store::{MigrationRecord, MigrationStatus, RevisionStore};

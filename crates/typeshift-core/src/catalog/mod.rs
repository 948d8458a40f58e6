//! Schema graph model.
//!
//! Declarations (types, pointers, constraints) are validated into an
//! immutable [`SchemaSnapshot`] carrying the resolved inheritance table.

mod constraint;
mod error;
mod pointer;
mod resolve;
mod snapshot;
mod type_def;
mod types;

pub use constraint::ConstraintDef;
pub use error::SchemaError;
pub use pointer::PointerDef;
pub use resolve::{EffectiveTable, ResolvedConstraint, ResolvedPointer};
pub use snapshot::{SchemaSnapshot, SchemaSource};
pub use type_def::TypeDef;
pub use types::{canonical_type_name, Cardinality, PointerKind, ScalarType, TypeKind};

pub(crate) use resolve::inherited_pointer;

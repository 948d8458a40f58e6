//! Safety grading for schema migrations.
//!
//! Assigns every operation of a diff a safety grade (A/B/C/D) based on what
//! it does to existing data.

use super::diff::SchemaDiff;
use super::error::SafetyGrade;
use super::operation::Operation;
use serde::Serialize;

/// Grading result for a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeGrade {
    /// The safety grade for this change.
    pub grade: SafetyGrade,
    /// Description of the change.
    pub change_description: String,
    /// Reasoning for the grade.
    pub reasoning: String,
    /// Whether existing instances need values written.
    pub requires_backfill: bool,
}

impl ChangeGrade {
    fn new(grade: SafetyGrade, op: &Operation, reasoning: impl Into<String>) -> Self {
        Self {
            grade,
            change_description: op.description(),
            reasoning: reasoning.into(),
            requires_backfill: false,
        }
    }

    fn with_backfill(mut self) -> Self {
        self.requires_backfill = true;
        self
    }
}

/// Complete grading result for a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationGrade {
    /// The worst grade among all changes.
    pub overall_grade: SafetyGrade,
    /// Individual grades, in diff order.
    pub change_grades: Vec<ChangeGrade>,
    /// Warnings about the migration.
    pub warnings: Vec<String>,
}

impl MigrationGrade {
    /// Changes graded C or D.
    pub fn blocking_changes(&self) -> impl Iterator<Item = &ChangeGrade> {
        self.change_grades
            .iter()
            .filter(|g| g.grade >= SafetyGrade::C)
    }

    /// Check if any backfill is required.
    pub fn requires_backfill(&self) -> bool {
        self.change_grades.iter().any(|g| g.requires_backfill)
    }

    /// Check if the migration only adds to the schema or fills data.
    pub fn is_non_breaking(&self) -> bool {
        self.overall_grade <= SafetyGrade::B
    }
}

/// Grades schema diffs for safety.
pub struct SafetyGrader;

impl SafetyGrader {
    /// Grade a schema diff.
    pub fn grade(diff: &SchemaDiff) -> MigrationGrade {
        let change_grades: Vec<ChangeGrade> =
            diff.operations.iter().map(Self::grade_operation).collect();
        let overall_grade = change_grades
            .iter()
            .map(|g| g.grade)
            .max()
            .unwrap_or(SafetyGrade::A);
        let warnings = Self::generate_warnings(&change_grades, diff);

        MigrationGrade {
            overall_grade,
            change_grades,
            warnings,
        }
    }

    /// Grade a single operation.
    pub fn grade_operation(op: &Operation) -> ChangeGrade {
        match op {
            Operation::CreateType { .. } => {
                ChangeGrade::new(SafetyGrade::A, op, "new types hold no data")
            }
            Operation::DropType { .. } => {
                ChangeGrade::new(SafetyGrade::D, op, "all instances of the type are lost")
            }
            Operation::RenameType { .. } => {
                ChangeGrade::new(SafetyGrade::C, op, "clients addressing the old name break")
            }
            Operation::AlterBase { .. } => ChangeGrade::new(
                SafetyGrade::C,
                op,
                "inherited pointers and constraints change for existing instances",
            ),
            Operation::AlterAbstract { to: true, .. } => {
                ChangeGrade::new(SafetyGrade::C, op, "the type can no longer be instantiated")
            }
            Operation::AlterAbstract { to: false, .. } => {
                ChangeGrade::new(SafetyGrade::A, op, "concrete types accept new instances")
            }
            Operation::AddProperty { pointer, .. } => {
                match (pointer.required, pointer.default.is_some()) {
                    (true, false) => ChangeGrade::new(
                        SafetyGrade::D,
                        op,
                        "existing instances have no value for a required pointer",
                    ),
                    (true, true) => ChangeGrade::new(
                        SafetyGrade::B,
                        op,
                        "existing instances are filled with the default",
                    )
                    .with_backfill(),
                    (false, _) => {
                        ChangeGrade::new(SafetyGrade::A, op, "optional pointers start empty")
                    }
                }
            }
            Operation::DropProperty { .. } => {
                ChangeGrade::new(SafetyGrade::D, op, "stored values are lost")
            }
            Operation::RenameProperty { .. } => {
                ChangeGrade::new(SafetyGrade::C, op, "clients addressing the old name break")
            }
            Operation::AlterCardinality { from, to, .. } if from.is_narrowing(*to) => {
                ChangeGrade::new(
                    SafetyGrade::C,
                    op,
                    "narrowing requires every instance to hold at most one value",
                )
            }
            Operation::AlterCardinality { .. } => {
                ChangeGrade::new(SafetyGrade::A, op, "widening keeps every value")
            }
            Operation::AlterDefault { .. } => {
                ChangeGrade::new(SafetyGrade::A, op, "defaults apply to new instances only")
            }
            Operation::AlterRequired {
                to: true,
                has_default: false,
                ..
            } => ChangeGrade::new(
                SafetyGrade::D,
                op,
                "instances without a value cannot be filled",
            ),
            Operation::AlterRequired { to: true, .. } => ChangeGrade::new(
                SafetyGrade::B,
                op,
                "instances without a value are filled with the default",
            )
            .with_backfill(),
            Operation::AlterRequired { .. } => {
                ChangeGrade::new(SafetyGrade::A, op, "relaxing a requirement keeps every value")
            }
            Operation::AlterTarget { .. } => {
                ChangeGrade::new(SafetyGrade::C, op, "stored values must be converted")
            }
            Operation::AlterExclusive { to: true, .. } => {
                ChangeGrade::new(SafetyGrade::B, op, "existing values must be unique")
            }
            Operation::AlterExclusive { .. } => {
                ChangeGrade::new(SafetyGrade::A, op, "dropping a constraint keeps every value")
            }
            Operation::AddConstraint { .. } => {
                ChangeGrade::new(SafetyGrade::B, op, "existing values must be unique")
            }
            Operation::DropConstraint { .. } => {
                ChangeGrade::new(SafetyGrade::A, op, "dropping a constraint keeps every value")
            }
        }
    }

    fn generate_warnings(grades: &[ChangeGrade], diff: &SchemaDiff) -> Vec<String> {
        let mut warnings = Vec::new();

        let destructive_count = grades.iter().filter(|g| g.grade == SafetyGrade::D).count();
        if destructive_count > 1 {
            warnings.push(format!(
                "Multiple destructive changes ({}) detected - consider breaking into smaller migrations",
                destructive_count
            ));
        }

        let backfill_count = grades.iter().filter(|g| g.requires_backfill).count();
        if backfill_count > 3 {
            warnings.push(format!(
                "Multiple backfill operations ({}) may take significant time",
                backfill_count
            ));
        }

        for op in &diff.operations {
            match op {
                Operation::DropType { def } => {
                    let dropped_members = diff
                        .operations
                        .iter()
                        .filter(|other| {
                            matches!(other, Operation::DropProperty { .. })
                                && other.type_name() == def.name
                        })
                        .count()
                        + def.pointers.len();
                    if dropped_members > 0 {
                        warnings.push(format!(
                            "Dropping type '{}' also drops {} pointer(s)",
                            def.name, dropped_members
                        ));
                    }
                }
                Operation::AlterTarget { path, from, to } => {
                    warnings.push(format!(
                        "Values of '{}' are cast from {} to {}",
                        path, from, to
                    ));
                }
                _ => {}
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PointerDef, SchemaSnapshot, TypeDef};

    fn user() -> TypeDef {
        TypeDef::object("User").with_pointer(PointerDef::property("name", "str"))
    }

    fn grade(from: Vec<TypeDef>, to: Vec<TypeDef>) -> MigrationGrade {
        let from = SchemaSnapshot::build(1, from).unwrap();
        let to = SchemaSnapshot::build(2, to).unwrap();
        SafetyGrader::grade(&SchemaDiff::compute(&from, &to).unwrap())
    }

    #[test]
    fn test_grade_a_add_optional_pointer() {
        let result = grade(
            vec![user()],
            vec![user().with_pointer(PointerDef::property("age", "int32"))],
        );

        assert_eq!(result.overall_grade, SafetyGrade::A);
        assert!(result.is_non_breaking());
        assert!(!result.requires_backfill());
    }

    #[test]
    fn test_grade_a_add_type() {
        let result = grade(vec![user()], vec![user(), TypeDef::object("Post")]);

        assert_eq!(result.overall_grade, SafetyGrade::A);
        assert_eq!(result.change_grades.len(), 1);
    }

    #[test]
    fn test_grade_b_required_with_default() {
        let result = grade(
            vec![user()],
            vec![user().with_pointer(
                PointerDef::property("status", "str")
                    .required()
                    .with_default("'active'"),
            )],
        );

        assert_eq!(result.overall_grade, SafetyGrade::B);
        assert!(result.requires_backfill());
    }

    #[test]
    fn test_grade_c_narrowing() {
        let result = grade(
            vec![user().with_pointer(PointerDef::property("tags", "str").multi())],
            vec![user().with_pointer(PointerDef::property("tags", "str"))],
        );

        assert_eq!(result.overall_grade, SafetyGrade::C);
        assert_eq!(result.blocking_changes().count(), 1);
    }

    #[test]
    fn test_grade_d_drop_type() {
        let result = grade(vec![user(), TypeDef::object("Post")], vec![user()]);

        assert_eq!(result.overall_grade, SafetyGrade::D);
    }

    #[test]
    fn test_grade_d_required_without_default() {
        let result = grade(
            vec![user()],
            vec![TypeDef::object("User").with_pointer(PointerDef::property("name", "str").required())],
        );

        assert_eq!(result.overall_grade, SafetyGrade::D);
    }

    #[test]
    fn test_warnings_generated() {
        let result = grade(
            vec![
                user(),
                TypeDef::object("Post").with_pointer(PointerDef::property("title", "str")),
                TypeDef::object("Tag").with_pointer(PointerDef::property("label", "str")),
            ],
            vec![user()],
        );

        assert_eq!(result.overall_grade, SafetyGrade::D);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("Multiple destructive changes")));
        assert!(result.warnings.iter().any(|w| w.contains("'Post'")));
    }
}
